use axum::{
    Json,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use studyshare_types::api::ErrorResponse;

/// Every failure a handler can report. Each variant maps onto one HTTP
/// status and renders as `{success: false, error}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid role")]
    InvalidRole,
    #[error("No file uploaded")]
    MissingFile,
    #[error("File size exceeds maximum limit of {limit_mb}MB")]
    FileTooLarge { limit_mb: u64 },
    #[error("Only PDF, DOC, DOCX, PPT, PPTX, JPG, and PNG files are allowed")]
    UnsupportedType,
    #[error("A group must be selected for group materials")]
    MissingGroup,

    #[error("{0}")]
    Unauthenticated(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is deactivated. Please contact admin.")]
    AccountDeactivated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),
    #[error("Group not found")]
    GroupNotFound,

    #[error("Email already registered")]
    DuplicateEmail,
    #[error("{0} already exists")]
    DuplicateName(&'static str),
    #[error("{0}")]
    Conflict(String),

    #[error("Database error occurred")]
    Storage(#[source] anyhow::Error),
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidRole
            | ApiError::MissingFile
            | ApiError::FileTooLarge { .. }
            | ApiError::UnsupportedType
            | ApiError::MissingGroup => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_)
            | ApiError::InvalidCredentials
            | ApiError::AccountDeactivated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::GroupNotFound => StatusCode::NOT_FOUND,
            // Duplicates surface as 400, not 409.
            ApiError::DuplicateEmail | ApiError::DuplicateName(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Storage failures from the db crate. Unique violations that a service did
/// not translate itself still come out as a conflict rather than a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if studyshare_db::is_unique_violation(&err) {
            return ApiError::Conflict("Resource already exists".into());
        }
        ApiError::Storage(err)
    }
}

// Extractor rejections render through the envelope like any other bad input.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Storage(e) => error!("Storage error: {:#}", e),
            ApiError::Internal(e) => error!("Internal error: {:#}", e),
            _ => {}
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_map_to_bad_request() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::DuplicateName("Group name").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::DuplicateName("Group name").to_string(),
            "Group name already exists"
        );
    }

    #[test]
    fn storage_errors_hide_details() {
        let err = ApiError::from(anyhow::anyhow!("SQLITE_BUSY: database is locked at /var/db"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Database error occurred");
    }

    #[test]
    fn credential_failures_are_distinct() {
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AccountDeactivated.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(
            ApiError::InvalidCredentials.to_string(),
            ApiError::AccountDeactivated.to_string()
        );
    }

    #[test]
    fn file_too_large_reports_limit() {
        let err = ApiError::FileTooLarge { limit_mb: 10 };
        assert_eq!(err.to_string(), "File size exceeds maximum limit of 10MB");
    }
}
