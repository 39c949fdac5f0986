use std::sync::Arc;

use studyshare_db::Database;

use crate::error::ApiError;
use crate::storage::Storage;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs, constructed once at startup and injected
/// through axum's `State` extractor.
pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub tokens: TokenService,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_file_size: u64,
    pub password_policy: PasswordPolicy,
    /// Mark the auth cookie `Secure` (HTTPS deployments).
    pub cookie_secure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            password_policy: PasswordPolicy::default(),
            cookie_secure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl AppStateInner {
    /// Run blocking work (SQLite, Argon2) off the async runtime.
    pub async fn blocking<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&state)).await?
    }
}
