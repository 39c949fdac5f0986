use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use studyshare_types::api::{ApiResponse, Claims, CreateGroupRequest, JoinGroupRequest};
use studyshare_types::models::{Group, GroupMember, Material};

use crate::error::ApiError;
use crate::materials::non_blank;
use crate::state::{AppState, AppStateInner};

fn ensure_group(s: &AppStateInner, id: i64) -> Result<(), ApiError> {
    match s.db.get_group(id)? {
        Some(_) => Ok(()),
        None => Err(ApiError::GroupNotFound),
    }
}

/// GET /api/groups
pub async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.blocking(|s| Ok(s.db.list_groups()?)).await?;
    let groups: Vec<Group> = rows.into_iter().map(Group::from).collect();
    Ok(Json(ApiResponse::list(groups)))
}

/// POST /api/groups
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateGroupRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Group name is required"));
    }
    let description = non_blank(req.description);

    let row = state
        .blocking(move |s| {
            s.db.create_group(&name, description.as_deref()).map_err(|e| {
                if studyshare_db::is_unique_violation(&e) {
                    ApiError::DuplicateName("Group name")
                } else {
                    ApiError::from(e)
                }
            })
        })
        .await?;
    info!("Group {} ({}) created by user {}", row.id, row.name, claims.sub);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(Group::from(row)).with_message("Group created successfully")),
    ))
}

/// GET /api/groups/{id}/materials
pub async fn group_materials(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .blocking(move |s| {
            ensure_group(s, id)?;
            Ok(s.db.list_group_materials(id)?)
        })
        .await?;
    let materials: Vec<Material> = rows.into_iter().map(Material::from).collect();
    Ok(Json(ApiResponse::list(materials)))
}

/// POST /api/groups/{id}/join. Membership is a free-text name, not an account.
pub async fn join_group(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<JoinGroupRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let member_name = req.member_name.trim().to_string();
    if member_name.is_empty() {
        return Err(ApiError::validation("Member name is required"));
    }

    let row = state
        .blocking(move |s| {
            ensure_group(s, id)?;
            Ok(s.db.add_group_member(id, &member_name)?)
        })
        .await?;

    Ok(Json(ApiResponse::ok(GroupMember::from(row)).with_message("Successfully joined group")))
}

/// GET /api/groups/{id}/members
pub async fn group_members(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .blocking(move |s| {
            ensure_group(s, id)?;
            Ok(s.db.list_group_members(id)?)
        })
        .await?;
    let members: Vec<GroupMember> = rows.into_iter().map(GroupMember::from).collect();
    Ok(Json(ApiResponse::list(members)))
}

/// DELETE /api/groups/{id}. Refused while any material still belongs to the group.
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .blocking(move |s| {
            ensure_group(s, id)?;
            let in_use = s.db.count_group_materials(id)?;
            if in_use > 0 {
                return Err(ApiError::Conflict(format!(
                    "Group still has {} material(s); delete them first",
                    in_use
                )));
            }
            s.db.delete_group(id).map_err(|e| {
                // A material uploaded between the count and the delete.
                if studyshare_db::is_foreign_key_violation(&e) {
                    ApiError::Conflict("Group still has materials; delete them first".into())
                } else {
                    ApiError::from(e)
                }
            })?;
            Ok(())
        })
        .await?;
    info!("Group {} deleted by user {}", id, claims.sub);

    Ok(Json(ApiResponse::ok(()).with_message("Group deleted successfully")))
}
