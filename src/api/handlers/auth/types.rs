//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::models::{AccessClaims, SessionSummary, User};
use crate::auth::token::TokenPair;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

impl From<&AccessClaims> for UserSummary {
    fn from(claims: &AccessClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email.clone(),
            role: claims.role.clone(),
        }
    }
}

/// Issued credentials. The refresh secret travels in the session cookie,
/// never in this body.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserSummary,
}

impl TokenResponse {
    #[must_use]
    pub fn new(pair: &TokenPair) -> Self {
        let claims = &pair.access.claims;
        Self {
            access_token: pair.access.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: claims.exp - claims.iat,
            user: UserSummary::from(claims),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct RefreshRequest {
    /// Fallback for clients that cannot send the session cookie.
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutAllResponse {
    pub sessions_revoked: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionItem {
    pub id: Uuid,
    pub created_at: String,
    pub expires_at: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_current: bool,
}

impl From<SessionSummary> for SessionItem {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            created_at: summary.created_at.to_rfc3339(),
            expires_at: summary.expires_at.to_rfc3339(),
            user_agent: summary.user_agent,
            ip_address: summary.ip_address,
            is_current: summary.is_current,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginHistoryItem {
    pub action: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

/// Body shape shared by every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::IssuedAccess;
    use anyhow::Result;
    use chrono::{Duration, Utc};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "alice@example.com");
        Ok(())
    }

    #[test]
    fn refresh_request_tolerates_an_empty_body() -> Result<()> {
        let decoded: RefreshRequest = serde_json::from_value(serde_json::json!({}))?;
        assert!(decoded.refresh_token.is_none());
        Ok(())
    }

    #[test]
    fn token_response_never_carries_the_refresh_secret() -> Result<()> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            role: "user".to_string(),
            permissions: vec!["users:read".to_string()],
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: now.timestamp() + 900,
        };
        let pair = TokenPair {
            access: IssuedAccess {
                token: "header.payload.signature".to_string(),
                claims,
            },
            refresh_secret: "super-secret".to_string(),
            refresh_expires_at: now + Duration::days(30),
        };

        let response = TokenResponse::new(&pair);
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 900);

        let value = serde_json::to_value(&response)?;
        assert!(!value.to_string().contains("super-secret"));
        Ok(())
    }
}
