use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use studyshare_types::api::{ApiResponse, Claims, CreateSubjectRequest};
use studyshare_types::models::Subject;

use crate::error::ApiError;
use crate::materials::non_blank;
use crate::state::AppState;

/// GET /api/subjects
pub async fn list_subjects(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.blocking(|s| Ok(s.db.list_subjects()?)).await?;
    let subjects: Vec<Subject> = rows.into_iter().map(Subject::from).collect();
    Ok(Json(ApiResponse::list(subjects)))
}

/// GET /api/subjects/names, for autocomplete.
pub async fn subject_names(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let names = state.blocking(|s| Ok(s.db.subject_names()?)).await?;
    Ok(Json(ApiResponse::list(names)))
}

/// GET /api/subjects/semester/{semester}
pub async fn subjects_by_semester(
    State(state): State<AppState>,
    WithRejection(Path(semester), _): WithRejection<Path<String>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .blocking(move |s| Ok(s.db.subjects_by_semester(&semester)?))
        .await?;
    let subjects: Vec<Subject> = rows.into_iter().map(Subject::from).collect();
    Ok(Json(ApiResponse::list(subjects)))
}

/// POST /api/subjects
pub async fn create_subject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateSubjectRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Subject name is required"));
    }
    let department = non_blank(req.department);
    let semester = non_blank(req.semester);

    let row = state
        .blocking(move |s| {
            s.db.create_subject(&name, department.as_deref(), semester.as_deref())
                .map_err(|e| {
                    if studyshare_db::is_unique_violation(&e) {
                        ApiError::DuplicateName("Subject")
                    } else {
                        ApiError::from(e)
                    }
                })
        })
        .await?;
    info!("Subject {} created by user {}", row.name, claims.sub);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(Subject::from(row)).with_message("Subject created successfully")),
    ))
}
