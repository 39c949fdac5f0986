use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};

use studyshare_db::models::UserRow;
use studyshare_types::api::Claims;

use crate::error::ApiError;

/// Issues and verifies self-contained HS256 tokens. Nothing is stored
/// server-side: a token is valid until its `exp` passes or the secret rotates.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &UserRow) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            name: user.name.clone(),
            exp: (Utc::now() + self.ttl).timestamp().max(0) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(|e| ApiError::Internal(e.into()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    ApiError::Unauthenticated("Token expired. Please login again.".into())
                }
                _ => ApiError::Unauthenticated("Invalid token. Please login again.".into()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyshare_types::models::Role;

    fn user() -> UserRow {
        UserRow {
            id: 7,
            name: "Alice".into(),
            email: "alice@x.com".into(),
            password: "hash".into(),
            role: Role::Teacher,
            department: None,
            semester: None,
            phone: None,
            is_active: true,
            created_at: "2024-01-01 00:00:00".into(),
            last_login: None,
        }
    }

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let tokens = TokenService::new("secret-a", Duration::hours(24));
        let token = tokens.issue(&user()).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.name, "Alice");
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenService::new("secret-a", Duration::hours(1)).issue(&user()).unwrap();
        let err = TokenService::new("secret-b", Duration::hours(1)).verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(msg) if msg.starts_with("Invalid token")));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default 60s leeway.
        let tokens = TokenService::new("secret", Duration::hours(-2));
        let token = tokens.issue(&user()).unwrap();
        let err = tokens.verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(msg) if msg.starts_with("Token expired")));
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = TokenService::new("secret", Duration::hours(1));
        assert!(tokens.verify("not.a.jwt").is_err());
    }
}
