use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use super::{
    AuthState,
    types::{ErrorResponse, RefreshRequest, TokenResponse},
    utils::{extract_client_meta, refresh_cookie, refresh_cookie_header},
};
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated; a fresh refresh secret replaces the session cookie", body = TokenResponse),
        (status = 401, description = "Unknown, expired, or revoked refresh secret", body = ErrorResponse),
        (status = 429, description = "A rotation of this secret is already in progress", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    // Cookie first; the body field exists for clients that cannot send it.
    let secret = refresh_cookie(&headers)
        .or_else(|| body.and_then(|Json(request)| request.refresh_token))
        .ok_or(AuthError::InvalidToken)?;

    let client = extract_client_meta(&headers, Some(peer));
    let pair = state.flows().refresh(&secret, &client).await?;

    let mut response_headers = HeaderMap::new();
    match refresh_cookie_header(
        &pair.refresh_secret,
        state.flows().refresh_ttl_seconds(),
        state.config().secure_cookies(),
    ) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    Ok((StatusCode::OK, response_headers, Json(TokenResponse::new(&pair))))
}
