use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use studyshare_types::api::{
    ApiResponse, AuthResponse, ChangePasswordRequest, Claims, LoginRequest, RegisterRequest,
    VerifyResponse,
};
use studyshare_types::models::User;

use crate::accounts;
use crate::error::ApiError;
use crate::middleware::TOKEN_COOKIE;
use crate::state::AppState;

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state.blocking(move |s| accounts::register(s, req)).await?;
    let jar = jar.add(session_cookie(token.clone(), state.settings.cookie_secure));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(
            ApiResponse::ok(AuthResponse { user: User::from(user), token })
                .with_message("Registration successful"),
        ),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state
        .blocking(move |s| accounts::login(s, &req.email, &req.password))
        .await?;
    let jar = jar.add(session_cookie(token.clone(), state.settings.cookie_secure));

    Ok((
        jar,
        Json(ApiResponse::ok(AuthResponse { user: User::from(user), token }).with_message("Login successful")),
    ))
}

/// POST /api/auth/logout. Tokens are stateless; this only drops the cookie.
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
        Json(ApiResponse::ok(()).with_message("Logout successful")),
    )
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ChangePasswordRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .blocking(move |s| accounts::change_password(s, claims.sub, req))
        .await?;
    Ok(Json(ApiResponse::ok(()).with_message("Password changed successfully")))
}

/// GET /api/auth/verify
pub async fn verify(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(ApiResponse::ok(VerifyResponse { authenticated: true, user: claims }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .blocking(move |s| {
            s.db.get_user_by_id(claims.sub)?
                .ok_or_else(|| ApiError::not_found("User not found"))
        })
        .await?;
    Ok(Json(ApiResponse::ok(User::from(user))))
}
