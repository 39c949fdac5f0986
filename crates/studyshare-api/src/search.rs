use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;

use studyshare_types::api::{ApiResponse, LimitQuery, SearchQuery};
use studyshare_types::models::{Material, MaterialFilter};

use crate::error::ApiError;
use crate::materials::non_blank;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 10;

/// GET /api/search?q=&subject=&semester=
pub async fn search_materials(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<SearchQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let q = non_blank(query.q).ok_or_else(|| ApiError::validation("Search query is required"))?;
    let filter = MaterialFilter {
        search: Some(q),
        subject: non_blank(query.subject),
        semester: non_blank(query.semester),
        ..Default::default()
    };

    let rows = state
        .blocking(move |s| Ok(s.db.list_public_materials(&filter)?))
        .await?;
    let materials: Vec<Material> = rows.into_iter().map(Material::from).collect();
    Ok(Json(ApiResponse::list(materials)))
}

/// GET /api/search/trending: most downloaded public materials.
pub async fn trending(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<LimitQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let rows = state.blocking(move |s| Ok(s.db.trending_materials(limit)?)).await?;
    let materials: Vec<Material> = rows.into_iter().map(Material::from).collect();
    Ok(Json(ApiResponse::list(materials)))
}

/// GET /api/search/recent
pub async fn recent(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<LimitQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MaterialFilter {
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT)),
        ..Default::default()
    };
    let rows = state
        .blocking(move |s| Ok(s.db.list_public_materials(&filter)?))
        .await?;
    let materials: Vec<Material> = rows.into_iter().map(Material::from).collect();
    Ok(Json(ApiResponse::list(materials)))
}
