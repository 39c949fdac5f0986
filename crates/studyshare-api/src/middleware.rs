use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use studyshare_types::api::{Claims, TokenQuery};
use studyshare_types::models::Role;

use crate::error::ApiError;
use crate::permissions::{self, Permission};
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// Bearer header first, then the `token` cookie.
fn header_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn query_token(req: &Request) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

fn authenticate(state: &AppState, token: Option<String>) -> Result<Claims, ApiError> {
    let token = token.ok_or_else(|| ApiError::Unauthenticated("Access denied. No token provided.".into()))?;
    state.tokens.verify(&token)
}

/// Reject the request unless it carries a valid token; the claims are
/// attached to the request extensions for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authenticate(&state, header_token(req.headers()))?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like [`require_auth`] but also accepts `?token=`, for links opened
/// directly by the browser (downloads).
pub async fn require_auth_or_query(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = header_token(req.headers()).or_else(|| query_token(&req));
    let claims = authenticate(&state, token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Attach claims when a valid token is present; otherwise continue anonymously.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = header_token(req.headers()) {
        if let Ok(claims) = state.tokens.verify(&token) {
            req.extensions_mut().insert(claims);
        }
    }
    next.run(req).await
}

fn current_claims(req: &Request) -> Result<&Claims, ApiError> {
    req.extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::Unauthenticated("Authentication required".into()))
}

/// Role allow-list. Must sit inside an authentication layer.
pub async fn require_roles(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = current_claims(&req)?;
    if !allowed.contains(&claims.role) {
        return Err(ApiError::forbidden(format!(
            "Access denied. Required role: {}",
            allowed.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(" or ")
        )));
    }
    Ok(next.run(req).await)
}

/// Permission check resolved through the role table. Must sit inside an
/// authentication layer.
pub async fn require_permission(
    State(permission): State<Permission>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    permissions::require(current_claims(&req)?, permission)?;
    Ok(next.run(req).await)
}
