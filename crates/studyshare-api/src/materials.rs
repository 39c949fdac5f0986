use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use studyshare_types::api::{ApiResponse, Claims, MaterialQuery};
use studyshare_types::models::{Material, MaterialFilter, Role};

use crate::error::ApiError;
use crate::permissions::{self, Permission};
use crate::state::AppState;
use crate::upload;

pub(crate) fn parse_bool(raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ApiError::validation(format!("Invalid boolean value: {}", other))),
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn material_filter(q: MaterialQuery) -> Result<MaterialFilter, ApiError> {
    let uploader_role = non_blank(q.uploader_role)
        .map(|r| r.parse::<Role>().map_err(|_| ApiError::InvalidRole))
        .transpose()?;
    let is_verified = non_blank(q.is_verified)
        .map(|v| parse_bool(&v))
        .transpose()?;

    Ok(MaterialFilter {
        subject: non_blank(q.subject),
        semester: non_blank(q.semester),
        uploader_role,
        is_verified,
        search: non_blank(q.search),
        limit: q.limit,
    })
}

/// GET /api/materials
pub async fn list_materials(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<MaterialQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = material_filter(query)?;
    let rows = state
        .blocking(move |s| Ok(s.db.list_public_materials(&filter)?))
        .await?;
    let materials: Vec<Material> = rows.into_iter().map(Material::from).collect();
    Ok(Json(ApiResponse::list(materials)))
}

/// GET /api/materials/{id}
pub async fn get_material(
    State(state): State<AppState>,
    viewer: Option<Extension<Claims>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    match viewer {
        Some(Extension(claims)) => debug!("Material {} viewed by user {}", id, claims.sub),
        None => debug!("Material {} viewed anonymously", id),
    }

    let row = state
        .blocking(move |s| {
            s.db.get_material(id)?
                .ok_or_else(|| ApiError::not_found("Material not found"))
        })
        .await?;
    Ok(Json(ApiResponse::ok(Material::from(row))))
}

/// POST /api/materials/upload
pub async fn upload_material(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    // Refuse before reading the body.
    permissions::require(&claims, Permission::UploadMaterial)?;

    let form = upload::read_form(multipart, state.settings.max_file_size).await?;
    let row = upload::upload(&state, claims, form).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(Material::from(row)).with_message("Material uploaded successfully")),
    ))
}

fn attachment_header(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() || !c.is_ascii() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// GET /api/materials/{id}/download
pub async fn download_material(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<Response, ApiError> {
    permissions::require(&claims, Permission::DownloadMaterial)?;

    let row = state
        .blocking(move |s| {
            s.db.get_material(id)?
                .ok_or_else(|| ApiError::not_found("Material not found"))
        })
        .await?;

    if !state.storage.exists(&row.file_path).await {
        error!("Material {} has no file on disk ({})", row.id, row.file_path);
        return Err(ApiError::not_found("File not found"));
    }

    let file = tokio::fs::File::open(state.storage.file_path(&row.file_path))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .len();

    state
        .blocking(move |s| Ok(s.db.increment_downloads(id)?))
        .await?;
    info!("Material {} downloaded by user {}", id, claims.sub);

    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, row.file_type.as_str())
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, attachment_header(&row.file_name))
        .body(body)
        .map_err(|e| ApiError::Internal(e.into()))
}

/// DELETE /api/materials/{id}
pub async fn delete_material(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .blocking(move |s| {
            s.db.get_material(id)?
                .ok_or_else(|| ApiError::not_found("Material not found"))
        })
        .await?;
    permissions::authorize_material_mutation(&claims, &row)?;

    state.blocking(move |s| Ok(s.db.delete_material(id)?)).await?;
    if let Err(e) = state.storage.delete_file(&row.file_path).await {
        error!("Failed to remove file {} of deleted material {}: {:#}", row.file_path, id, e);
    }
    info!("Material {} deleted by user {}", id, claims.sub);

    Ok(Json(ApiResponse::ok(()).with_message("Material deleted successfully")))
}

/// GET /api/materials/stats/overview
pub async fn material_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.blocking(|s| Ok(s.db.material_stats()?)).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
