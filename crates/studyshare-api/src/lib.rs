pub mod accounts;
pub mod auth;
pub mod error;
pub mod groups;
pub mod materials;
pub mod middleware;
pub mod permissions;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod subjects;
pub mod tokens;
pub mod upload;
pub mod users;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner, PasswordPolicy, Settings};
