use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde_json::json;

use studyshare_types::api::ApiResponse;
use studyshare_types::models::Role;

use crate::error::ApiError;
use crate::middleware::{optional_auth, require_auth, require_auth_or_query, require_permission, require_roles};
use crate::permissions::Permission;
use crate::state::AppState;
use crate::{auth, groups, materials, search, subjects, users};

const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Slack on top of the file limit for the text fields of an upload form.
const FORM_OVERHEAD: usize = 1024 * 1024;

async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({ "status": "ok" })).with_message("StudyShare API is running"))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

fn auth_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    let protected = Router::new()
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/verify", get(auth::verify))
        .route("/auth/me", get(auth::me))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

fn material_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/materials", get(materials::list_materials))
        .route("/materials/{id}", get(materials::get_material))
        .route_layer(from_fn_with_state(state.clone(), optional_auth));

    let upload_limit = state.settings.max_file_size as usize + FORM_OVERHEAD;
    let protected = Router::new()
        .route(
            "/materials/upload",
            post(materials::upload_material).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/materials/{id}", delete(materials::delete_material))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let download = Router::new()
        .route("/materials/{id}/download", get(materials::download_material))
        .route_layer(from_fn_with_state(state.clone(), require_auth_or_query));

    let analytics = Router::new()
        .route("/materials/stats/overview", get(materials::material_stats))
        .route_layer(from_fn_with_state(Permission::ViewAnalytics, require_permission))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected).merge(download).merge(analytics)
}

fn group_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/groups", get(groups::list_groups))
        .route("/groups/{id}/materials", get(groups::group_materials))
        .route("/groups/{id}/join", post(groups::join_group))
        .route("/groups/{id}/members", get(groups::group_members));

    let create = Router::new()
        .route("/groups", post(groups::create_group))
        .route_layer(from_fn_with_state(Permission::CreateGroup, require_permission))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let manage = Router::new()
        .route("/groups/{id}", delete(groups::delete_group))
        .route_layer(from_fn_with_state(Permission::ManageGroup, require_permission))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(create).merge(manage)
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let own = Router::new()
        .route("/users/profile", get(users::get_profile).put(users::update_profile))
        .route("/users/search", get(users::search_users))
        .route("/users/{id}", get(users::get_user))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/role/{role}", get(users::users_by_role))
        .route("/users/stats/overview", get(users::user_stats))
        .route("/users/{id}/activate", put(users::activate_user))
        .route("/users/{id}/deactivate", put(users::deactivate_user))
        .route("/users/{id}", delete(users::delete_user))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    own.merge(admin)
}

fn subject_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/subjects", get(subjects::list_subjects))
        .route("/subjects/names", get(subjects::subject_names))
        .route("/subjects/semester/{semester}", get(subjects::subjects_by_semester));

    let protected = Router::new()
        .route("/subjects", post(subjects::create_subject))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search::search_materials))
        .route("/search/trending", get(search::trending))
        .route("/search/recent", get(search::recent))
}

/// The full `/api` surface. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(auth_routes(&state))
        .merge(material_routes(&state))
        .merge(group_routes(&state))
        .merge(user_routes(&state))
        .merge(subject_routes(&state))
        .merge(search_routes());

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .with_state(state)
}
