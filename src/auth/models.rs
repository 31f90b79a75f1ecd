//! Persistent and wire-level types for the session engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User row as read by the engine. Lockout bookkeeping lives on the same row
/// so the counter transition can be a single UPDATE.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub failed_login_attempts: i32,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Lock state check; the attempt counter alone never blocks a login.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// True when any lockout field differs from its default.
    #[must_use]
    pub fn has_lockout_state(&self) -> bool {
        self.failed_login_attempts > 0
            || self.last_failed_login_at.is_some()
            || self.locked_until.is_some()
    }
}

/// One issued refresh secret. `token_hash` is the SHA-256 of the opaque
/// secret; the raw value never reaches the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub jti: Uuid,
    pub family_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_jti: Option<Uuid>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How rotation must treat a presented refresh record. The checks are
/// ordered: a rotated-out record is the reuse signal even when it has also
/// expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentedState {
    /// Revoked with a successor: someone replayed a rotated-out secret.
    Reused,
    /// Explicitly revoked, no successor; reject without touching siblings.
    Revoked,
    Expired,
    Live,
}

impl RefreshRecord {
    /// A revoked record that points at a successor was superseded by
    /// rotation; presenting it again is the token-reuse signal.
    #[must_use]
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by_jti.is_some()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn presented_state(&self, now: DateTime<Utc>) -> PresentedState {
        if self.was_rotated() {
            PresentedState::Reused
        } else if self.revoked {
            PresentedState::Revoked
        } else if self.is_expired(now) {
            PresentedState::Expired
        } else {
            PresentedState::Live
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Logout,
    LogoutAll,
    PasswordChange,
    SessionRevoked,
    Reuse,
}

impl RevocationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::PasswordChange => "password_change",
            Self::SessionRevoked => "session_revoked",
            Self::Reuse => "token_reuse",
        }
    }
}

/// Durable blacklist entry for one access token `jti`.
#[derive(Debug, Clone)]
pub struct RevocationEntry {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub reason: RevocationReason,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried by a signed access token. `iat`/`exp` are Unix seconds as
/// expected by JWT validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Append-only login attempt used for email/IP correlation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginAttempt {
    pub id: i64,
    pub email: String,
    pub ip_address: String,
    pub success: bool,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Active session summary as returned by the sessions listing.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_current: bool,
}
