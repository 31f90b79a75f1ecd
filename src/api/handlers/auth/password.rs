use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{
    AuthState,
    logout::cookie_clearing_headers,
    principal::require_auth,
    types::{ChangePasswordRequest, ErrorResponse, MessageResponse},
    utils::extract_client_meta,
};
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; every session ended", body = MessageResponse),
        (status = 401, description = "Missing token or wrong current password", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;
    let client = extract_client_meta(&headers, Some(peer));

    state
        .flows()
        .change_password(
            principal.user_id,
            &body.current_password,
            &body.new_password,
            Some((&principal.claims, &principal.token)),
            &client,
        )
        .await?;

    // The current session died with the rest; the cookie goes with it.
    Ok((
        StatusCode::OK,
        cookie_clearing_headers(&state),
        Json(MessageResponse {
            message: "Password changed, all sessions have been signed out".to_string(),
        }),
    ))
}
