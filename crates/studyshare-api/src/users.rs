use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use studyshare_db::models::ProfileUpdate;
use studyshare_types::api::{ApiResponse, Claims, SearchQuery, UpdateProfileRequest, UserListQuery};
use studyshare_types::models::{Role, User, UserFilter};

use crate::error::ApiError;
use crate::materials::{non_blank, parse_bool};
use crate::permissions::{self, Permission};
use crate::state::AppState;

fn user_filter(q: UserListQuery) -> Result<UserFilter, ApiError> {
    Ok(UserFilter {
        role: non_blank(q.role)
            .map(|r| r.parse::<Role>().map_err(|_| ApiError::InvalidRole))
            .transpose()?,
        department: non_blank(q.department),
        semester: non_blank(q.semester),
        is_active: non_blank(q.is_active).map(|v| parse_bool(&v)).transpose()?,
        limit: q.limit,
    })
}

fn users(rows: Vec<studyshare_db::models::UserRow>) -> Vec<User> {
    rows.into_iter().map(User::from).collect()
}

/// GET /api/users/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .blocking(move |s| {
            s.db.get_user_by_id(claims.sub)?
                .ok_or_else(|| ApiError::not_found("User not found"))
        })
        .await?;
    Ok(Json(ApiResponse::ok(User::from(row))))
}

/// PUT /api/users/profile. Only name, department, semester and phone are editable.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation("Name cannot be empty"));
    }

    let row = state
        .blocking(move |s| {
            let name = req.name.as_deref().map(str::trim);
            let update = ProfileUpdate {
                name,
                department: req.department.as_deref(),
                semester: req.semester.as_deref(),
                phone: req.phone.as_deref(),
            };
            if update.is_empty() {
                return Err(ApiError::validation("No fields to update"));
            }
            if s.db.update_profile(claims.sub, &update)? == 0 {
                return Err(ApiError::not_found("User not found"));
            }
            s.db.get_user_by_id(claims.sub)?
                .ok_or_else(|| ApiError::not_found("User not found"))
        })
        .await?;

    Ok(Json(ApiResponse::ok(User::from(row)).with_message("Profile updated successfully")))
}

/// GET /api/users/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<SearchQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let term = non_blank(query.q).ok_or_else(|| ApiError::validation("Search query is required"))?;
    let rows = state.blocking(move |s| Ok(s.db.search_users(&term)?)).await?;
    Ok(Json(ApiResponse::list(users(rows))))
}

/// GET /api/users/{id}. Self, or anyone allowed to view users.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != id && !permissions::has_permission(claims.role, Permission::ViewUsers) {
        return Err(ApiError::forbidden("Access denied"));
    }
    let row = state
        .blocking(move |s| {
            s.db.get_user_by_id(id)?
                .ok_or_else(|| ApiError::not_found("User not found"))
        })
        .await?;
    Ok(Json(ApiResponse::ok(User::from(row))))
}

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<UserListQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = user_filter(query)?;
    let rows = state.blocking(move |s| Ok(s.db.list_users(&filter)?)).await?;
    Ok(Json(ApiResponse::list(users(rows))))
}

/// GET /api/users/role/{role} (admin)
pub async fn users_by_role(
    State(state): State<AppState>,
    WithRejection(Path(role), _): WithRejection<Path<String>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let role = role.parse::<Role>().map_err(|_| ApiError::InvalidRole)?;
    let filter = UserFilter { role: Some(role), ..Default::default() };
    let rows = state.blocking(move |s| Ok(s.db.list_users(&filter)?)).await?;
    Ok(Json(ApiResponse::list(users(rows))))
}

async fn set_active(state: AppState, claims: Claims, id: i64, active: bool) -> Result<(), ApiError> {
    if !active && claims.sub == id {
        return Err(ApiError::validation("You cannot deactivate your own account"));
    }
    let changed = state
        .blocking(move |s| Ok(s.db.set_user_active(id, active)?))
        .await?;
    if changed == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    info!("User {} {} by admin {}", id, if active { "activated" } else { "deactivated" }, claims.sub);
    Ok(())
}

/// PUT /api/users/{id}/activate (admin)
pub async fn activate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    set_active(state, claims, id, true).await?;
    Ok(Json(ApiResponse::ok(()).with_message("User activated successfully")))
}

/// PUT /api/users/{id}/deactivate (admin)
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    set_active(state, claims, id, false).await?;
    Ok(Json(ApiResponse::ok(()).with_message("User deactivated successfully")))
}

/// DELETE /api/users/{id} (admin). Materials keep their uploader id.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub == id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }
    let deleted = state.blocking(move |s| Ok(s.db.delete_user(id)?)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    info!("User {} deleted by admin {}", id, claims.sub);
    Ok(Json(ApiResponse::ok(()).with_message("User deleted successfully")))
}

/// GET /api/users/stats/overview (admin)
pub async fn user_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.blocking(|s| Ok(s.db.user_stats()?)).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
