use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "secret",
];

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub token_ttl_hours: i64,
    pub password_require_special: bool,
    pub cookie_secure: bool,
    pub admin: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `STUDYSHARE_*` names, defaults applied for
    /// everything except the JWT secret.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("STUDYSHARE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("STUDYSHARE_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port = match var("STUDYSHARE_PORT") {
            Some(p) => p.parse::<u16>().context("STUDYSHARE_PORT must be a port number")?,
            None => 3000,
        };
        let max_file_size = match var("STUDYSHARE_MAX_FILE_SIZE") {
            Some(v) => v.parse::<u64>().context("STUDYSHARE_MAX_FILE_SIZE must be a byte count")?,
            None => 10 * 1024 * 1024,
        };
        let token_ttl_hours = match var("STUDYSHARE_TOKEN_TTL_HOURS") {
            Some(v) => v.parse::<i64>().context("STUDYSHARE_TOKEN_TTL_HOURS must be an integer")?,
            None => 24,
        };
        if token_ttl_hours <= 0 {
            bail!("STUDYSHARE_TOKEN_TTL_HOURS must be positive");
        }

        let flag = |key: &str| {
            var(key)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let admin = match (var("STUDYSHARE_ADMIN_EMAIL"), var("STUDYSHARE_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: var("STUDYSHARE_ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
            }),
            (Some(_), None) | (None, Some(_)) => {
                bail!("STUDYSHARE_ADMIN_EMAIL and STUDYSHARE_ADMIN_PASSWORD must be set together")
            }
            (None, None) => None,
        };

        Ok(Self {
            jwt_secret,
            host: var("STUDYSHARE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("STUDYSHARE_DB_PATH").unwrap_or_else(|| "studyshare.db".into()).into(),
            upload_dir: var("STUDYSHARE_UPLOAD_DIR")
                .unwrap_or_else(|| "./uploads/materials".into())
                .into(),
            max_file_size,
            token_ttl_hours,
            password_require_special: flag("STUDYSHARE_PASSWORD_REQUIRE_SPECIAL"),
            cookie_secure: flag("STUDYSHARE_COOKIE_SECURE"),
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[("STUDYSHARE_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(c.port, 3000);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.max_file_size, 10_485_760);
        assert_eq!(c.token_ttl_hours, 24);
        assert_eq!(c.upload_dir, PathBuf::from("./uploads/materials"));
        assert!(!c.password_require_special);
        assert!(c.admin.is_none());
    }

    #[test]
    fn placeholder_or_missing_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("STUDYSHARE_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_and_flags() {
        let c = config(&[
            ("STUDYSHARE_JWT_SECRET", "a-real-secret"),
            ("STUDYSHARE_PORT", "8080"),
            ("STUDYSHARE_COOKIE_SECURE", "true"),
            ("STUDYSHARE_ADMIN_EMAIL", "root@x.com"),
            ("STUDYSHARE_ADMIN_PASSWORD", "Adm1nPass"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert!(c.cookie_secure);
        let admin = c.admin.unwrap();
        assert_eq!(admin.email, "root@x.com");
        assert_eq!(admin.name, "Administrator");
    }

    #[test]
    fn bad_numbers_and_half_admin_seed_fail() {
        assert!(config(&[("STUDYSHARE_JWT_SECRET", "s3cret!"), ("STUDYSHARE_PORT", "http")]).is_err());
        assert!(config(&[("STUDYSHARE_JWT_SECRET", "s3cret!"), ("STUDYSHARE_TOKEN_TTL_HOURS", "0")]).is_err());
        assert!(config(&[("STUDYSHARE_JWT_SECRET", "s3cret!"), ("STUDYSHARE_ADMIN_EMAIL", "a@x.com")]).is_err());
    }
}
