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
    types::{ErrorResponse, LoginRequest, TokenResponse, UserSummary},
    utils::{extract_client_meta, refresh_cookie_header},
};
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; refresh secret set as session cookie", body = TokenResponse),
        (status = 401, description = "Invalid credentials or inactive account", body = ErrorResponse),
        (status = 429, description = "Account temporarily locked", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let client = extract_client_meta(&headers, Some(peer));
    let outcome = state.flows().login(&body.email, &body.password, &client).await?;

    let mut response_headers = HeaderMap::new();
    match refresh_cookie_header(
        &outcome.tokens.refresh_secret,
        state.flows().refresh_ttl_seconds(),
        state.config().secure_cookies(),
    ) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    let mut response = TokenResponse::new(&outcome.tokens);
    response.user = UserSummary::from(&outcome.user);

    Ok((StatusCode::OK, response_headers, Json(response)))
}
