use axum::{
    Json,
    extract::{ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    AuthState,
    principal::require_auth,
    types::{ErrorResponse, SessionItem},
    utils::{extract_client_meta, refresh_cookie},
};
use crate::auth::AuthError;

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "The caller's live sessions, newest first", body = [SessionItem]),
        (status = 401, description = "Missing, expired, or revoked access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;
    let secret = refresh_cookie(&headers);

    let sessions = state
        .flows()
        .list_sessions(principal.user_id, secret.as_deref())
        .await?;
    let items: Vec<SessionItem> = sessions.into_iter().map(SessionItem::from).collect();

    Ok((StatusCode::OK, Json(items)))
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id from the listing")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing, expired, or revoked access token", body = ErrorResponse),
        (status = 404, description = "No live session with this id belongs to the caller", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;
    let client = extract_client_meta(&headers, Some(peer));

    state
        .flows()
        .revoke_session(principal.user_id, id, &client)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
