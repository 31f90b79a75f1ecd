//! Typed domain errors for the session engine.
//!
//! Every fallible operation surfaces one of these variants; the single
//! `IntoResponse` impl at the bottom is the only place where a variant is
//! turned into an HTTP status. Infrastructure failures keep their own
//! variant so an unreachable database is never reported as a 401.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is not active")]
    InactiveUser,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Current password is incorrect")]
    InvalidCurrentPassword,
    #[error("Account is temporarily locked, try again later")]
    AccountLocked,
    #[error("Token refresh already in progress, retry shortly")]
    RefreshInProgress,
    #[error("Session not found")]
    SessionNotFound,
    // Coalesced refresh waiters each receive a clone of the settled outcome,
    // so the underlying report lives behind an Arc.
    #[error("Internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InactiveUser
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::InvalidCurrentPassword => StatusCode::UNAUTHORIZED,
            Self::AccountLocked | Self::RefreshInProgress => StatusCode::TOO_MANY_REQUESTS,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code included in error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InactiveUser => "inactive_user",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::InvalidCurrentPassword => "invalid_current_password",
            Self::AccountLocked => "account_locked",
            Self::RefreshInProgress => "refresh_in_progress",
            Self::SessionNotFound => "session_not_found",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Expected outcomes stay below error severity; only infrastructure
        // failures are true errors.
        match &self {
            AuthError::Internal(err) => error!("internal error: {err:#}"),
            AuthError::AccountLocked | AuthError::TokenRevoked => warn!("{self}"),
            other => debug!("{other}"),
        }

        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        (self.status(), Json(body)).into_response()
    }
}
