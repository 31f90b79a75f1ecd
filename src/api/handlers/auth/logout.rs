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
    principal::require_auth,
    types::{ErrorResponse, LogoutAllResponse},
    utils::{clear_refresh_cookie, extract_client_meta, refresh_cookie},
};
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session ended; access token blacklisted, cookie cleared"),
        (status = 401, description = "Missing, expired, or revoked access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;
    let client = extract_client_meta(&headers, Some(peer));
    let secret = refresh_cookie(&headers);

    state
        .flows()
        .logout(
            secret.as_deref(),
            Some((&principal.claims, &principal.token)),
            &client,
        )
        .await?;

    Ok((StatusCode::NO_CONTENT, cookie_clearing_headers(&state)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 200, description = "Every session of the caller ended", body = LogoutAllResponse),
        (status = 401, description = "Missing, expired, or revoked access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;
    let client = extract_client_meta(&headers, Some(peer));

    let sessions_revoked = state
        .flows()
        .logout_all(
            principal.user_id,
            Some((&principal.claims, &principal.token)),
            &client,
        )
        .await?;

    Ok((
        StatusCode::OK,
        cookie_clearing_headers(&state),
        Json(LogoutAllResponse { sessions_revoked }),
    ))
}

/// Always clear the cookie, even when no refresh secret accompanied the call.
pub(super) fn cookie_clearing_headers(state: &AuthState) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match clear_refresh_cookie(state.config().secure_cookies()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    headers
}
