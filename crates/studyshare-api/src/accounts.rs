use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;
use regex::Regex;
use tracing::{info, warn};

use studyshare_db::Database;
use studyshare_db::models::{NewUser, UserRow};
use studyshare_types::api::{ChangePasswordRequest, RegisterRequest};
use studyshare_types::models::Role;

use crate::error::ApiError;
use crate::state::{AppStateInner, PasswordPolicy};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid email format"))
    }
}

pub fn validate_password(policy: &PasswordPolicy, password: &str) -> Result<(), ApiError> {
    if password.chars().count() < policy.min_length {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters long",
            policy.min_length
        )));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation("Password must contain at least one uppercase letter"));
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::validation("Password must contain at least one lowercase letter"));
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("Password must contain at least one number"));
    }
    if policy.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(ApiError::validation("Password must contain at least one special character"));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Create an account and issue its first token. Runs on the blocking pool.
pub fn register(state: &AppStateInner, req: RegisterRequest) -> Result<(UserRow, String), ApiError> {
    let name = req.name.trim();
    let email = req.email.trim();
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Name, email, and password are required"));
    }
    validate_email(email)?;

    let role = match non_blank(req.role) {
        None => Role::Student,
        Some(r) => r.parse::<Role>().map_err(|_| ApiError::InvalidRole)?,
    };
    if role == Role::Admin {
        return Err(ApiError::forbidden("Administrator accounts cannot be self-registered"));
    }

    if state.db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::DuplicateEmail);
    }
    validate_password(&state.settings.password_policy, &req.password)?;

    let password_hash = hash_password(&req.password)?;
    let department = non_blank(req.department);
    let semester = non_blank(req.semester);
    let phone = non_blank(req.phone);

    let id = state
        .db
        .create_user(&NewUser {
            name,
            email,
            password_hash: &password_hash,
            role,
            department: department.as_deref(),
            semester: semester.as_deref(),
            phone: phone.as_deref(),
        })
        .map_err(|e| {
            // Lost a race with a concurrent registration of the same email.
            if studyshare_db::is_unique_violation(&e) {
                ApiError::DuplicateEmail
            } else {
                ApiError::from(e)
            }
        })?;

    let user = state
        .db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {} vanished after insert", id)))?;
    let token = state.tokens.issue(&user)?;
    info!("Registered user {} ({}) as {}", user.id, user.email, user.role.as_str());
    Ok((user, token))
}

/// Unknown email and wrong password are indistinguishable to the caller.
/// The active flag is consulted only once the password has verified.
pub fn login(state: &AppStateInner, email: &str, password: &str) -> Result<(UserRow, String), ApiError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let user = state
        .db
        .get_user_by_email(email)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(password, &user.password)? {
        warn!("Failed login for {}", email);
        return Err(ApiError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(ApiError::AccountDeactivated);
    }

    state.db.touch_last_login(user.id)?;
    let user = state.db.get_user_by_id(user.id)?.ok_or(ApiError::InvalidCredentials)?;
    let token = state.tokens.issue(&user)?;
    info!("User {} logged in", user.id);
    Ok((user, token))
}

pub fn change_password(
    state: &AppStateInner,
    user_id: i64,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    if req.old_password.is_empty() || req.new_password.is_empty() || req.confirm_password.is_empty() {
        return Err(ApiError::validation("All password fields are required"));
    }
    if req.new_password != req.confirm_password {
        return Err(ApiError::validation("New passwords do not match"));
    }

    let user = state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if !verify_password(&req.old_password, &user.password)? {
        return Err(ApiError::InvalidCredentials);
    }
    validate_password(&state.settings.password_policy, &req.new_password)?;

    let hash = hash_password(&req.new_password)?;
    state.db.update_password(user_id, &hash)?;
    info!("User {} changed password", user_id);
    Ok(())
}

/// Make sure an administrator with this email exists and can log in.
/// An existing account is promoted, reactivated and given the new password.
/// Returns the admin's id.
pub fn ensure_admin(db: &Database, email: &str, password: &str, name: &str) -> anyhow::Result<i64> {
    let hash = hash_password(password).map_err(|e| anyhow::anyhow!("{}", e))?;

    if let Some(existing) = db.get_user_by_email(email)? {
        db.promote_to_admin(existing.id, &hash)?;
        info!("Admin account {} refreshed", email);
        return Ok(existing.id);
    }

    let id = db.create_user(&NewUser {
        name,
        email,
        password_hash: &hash,
        role: Role::Admin,
        department: None,
        semester: None,
        phone: None,
    })?;
    info!("Admin account {} created", email);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::state::Settings;
    use crate::storage::Storage;
    use crate::tokens::TokenService;

    async fn state() -> (Arc<AppStateInner>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            storage: Storage::new(dir.path().to_path_buf()).await.unwrap(),
            tokens: TokenService::new("test-secret", Duration::hours(24)),
            settings: Settings::default(),
        });
        (state, dir)
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            name: "Alice".into(),
            email: "alice@x.com".into(),
            password: "Passw0rd".into(),
            ..Default::default()
        }
    }

    #[test]
    fn password_policy_rules() {
        let policy = PasswordPolicy::default();
        assert!(validate_password(&policy, "Passw0rd").is_ok());
        assert!(validate_password(&policy, "Pass0rd").is_err());
        assert!(validate_password(&policy, "password1").is_err());
        assert!(validate_password(&policy, "PASSWORD1").is_err());
        assert!(validate_password(&policy, "Password").is_err());

        let strict = PasswordPolicy { require_special: true, ..PasswordPolicy::default() };
        assert!(validate_password(&strict, "Passw0rd").is_err());
        assert!(validate_password(&strict, "Passw0rd!").is_ok());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("alice@x.com").is_ok());
        assert!(validate_email("alice@x").is_err());
        assert!(validate_email("al ice@x.com").is_err());
        assert!(validate_email("@x.com").is_err());
    }

    #[test]
    fn hash_is_salted_and_verifies() {
        let a = hash_password("Passw0rd").unwrap();
        let b = hash_password("Passw0rd").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("Passw0rd", &a).unwrap());
        assert!(!verify_password("passw0rd", &a).unwrap());
    }

    #[tokio::test]
    async fn register_defaults_to_student_and_rejects_duplicates() {
        let (state, _dir) = state().await;
        let (user, token) = register(&state, alice()).unwrap();
        assert_eq!(user.role, Role::Student);
        assert_ne!(user.password, "Passw0rd");
        assert_eq!(state.tokens.verify(&token).unwrap().sub, user.id);

        let err = register(&state, alice()).unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));
        assert!(state.db.get_user_by_email("alice@x.com").unwrap().is_some());
    }

    #[tokio::test]
    async fn register_rejects_unknown_and_admin_roles() {
        let (state, _dir) = state().await;
        let req = RegisterRequest { role: Some("superuser".into()), ..alice() };
        assert!(matches!(register(&state, req).unwrap_err(), ApiError::InvalidRole));

        let req = RegisterRequest { role: Some("admin".into()), ..alice() };
        assert!(matches!(register(&state, req).unwrap_err(), ApiError::Forbidden(_)));

        let req = RegisterRequest { role: Some("teacher".into()), ..alice() };
        assert_eq!(register(&state, req).unwrap().0.role, Role::Teacher);
    }

    #[tokio::test]
    async fn login_failures_share_a_message() {
        let (state, _dir) = state().await;
        register(&state, alice()).unwrap();

        let unknown = login(&state, "bob@x.com", "Passw0rd").unwrap_err();
        let wrong = login(&state, "alice@x.com", "Wr0ngpass").unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.to_string(), "Invalid email or password");
    }

    #[tokio::test]
    async fn deactivated_user_cannot_login() {
        let (state, _dir) = state().await;
        let (user, _) = register(&state, alice()).unwrap();
        state.db.set_user_active(user.id, false).unwrap();

        let err = login(&state, "alice@x.com", "Passw0rd").unwrap_err();
        assert!(matches!(err, ApiError::AccountDeactivated));
        // Without the right password the account state is not revealed.
        let err = login(&state, "alice@x.com", "Wr0ngpass").unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_records_last_login() {
        let (state, _dir) = state().await;
        register(&state, alice()).unwrap();
        let (user, _) = login(&state, "alice@x.com", "Passw0rd").unwrap();
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn change_password_flow() {
        let (state, _dir) = state().await;
        let (user, _) = register(&state, alice()).unwrap();

        let mismatch = ChangePasswordRequest {
            old_password: "Passw0rd".into(),
            new_password: "N3wPassword".into(),
            confirm_password: "N3wPassw0rd".into(),
        };
        assert!(matches!(change_password(&state, user.id, mismatch).unwrap_err(), ApiError::Validation(_)));

        let wrong_old = ChangePasswordRequest {
            old_password: "Nope1234A".into(),
            new_password: "N3wPassword".into(),
            confirm_password: "N3wPassword".into(),
        };
        assert!(matches!(change_password(&state, user.id, wrong_old).unwrap_err(), ApiError::InvalidCredentials));

        let ok = ChangePasswordRequest {
            old_password: "Passw0rd".into(),
            new_password: "N3wPassword".into(),
            confirm_password: "N3wPassword".into(),
        };
        change_password(&state, user.id, ok).unwrap();
        assert!(login(&state, "alice@x.com", "Passw0rd").is_err());
        assert!(login(&state, "alice@x.com", "N3wPassword").is_ok());
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let (state, _dir) = state().await;
        let first = ensure_admin(&state.db, "admin@x.com", "Adm1nPass", "Admin").unwrap();
        let second = ensure_admin(&state.db, "admin@x.com", "Adm1nPass2", "Admin").unwrap();
        assert_eq!(first, second);

        let (user, _) = login(&state, "admin@x.com", "Adm1nPass2").unwrap();
        assert_eq!(user.role, Role::Admin);
    }
}
