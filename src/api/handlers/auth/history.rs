use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::{
    AuthState,
    principal::require_auth,
    types::{ErrorResponse, LoginHistoryItem},
};
use crate::auth::AuthError;

const HISTORY_LIMIT: i64 = 20;

#[utoipa::path(
    get,
    path = "/v1/auth/login-history",
    responses(
        (status = 200, description = "Recent login activity for the caller, newest first", body = [LoginHistoryItem]),
        (status = 401, description = "Missing, expired, or revoked access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_history(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &state).await?;

    let rows = state
        .flows()
        .login_history(principal.user_id, HISTORY_LIMIT)
        .await?;
    let items: Vec<LoginHistoryItem> = rows
        .into_iter()
        .map(|row| LoginHistoryItem {
            action: row.action,
            status: row.status,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at.to_rfc3339(),
        })
        .collect();

    Ok((StatusCode::OK, Json(items)))
}
