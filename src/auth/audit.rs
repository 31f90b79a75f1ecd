//! Security audit trail.
//!
//! Writes are best-effort: a failed audit insert is logged and never fails
//! the operation that produced it.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{Instrument, error};
use uuid::Uuid;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    LogoutAll,
    PasswordChange,
    BruteForceBlock,
    TokenRefresh,
    TokenReuseDetected,
    SessionRevoked,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::PasswordChange => "password_change",
            Self::BruteForceBlock => "brute_force_block",
            Self::TokenRefresh => "token_refresh",
            Self::TokenReuseDetected => "token_reuse_detected",
            Self::SessionRevoked => "session_revoked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
    Blocked,
}

impl AuditOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
        }
    }
}

/// One audit entry under construction.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    action: AuditAction,
    outcome: AuditOutcome,
    user_id: Option<Uuid>,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    resource_type: Option<&'a str>,
    resource_id: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl<'a> AuditEvent<'a> {
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            outcome: AuditOutcome::Success,
            user_id: None,
            ip_address: None,
            user_agent: None,
            resource_type: None,
            resource_id: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_client(mut self, ip: Option<&'a str>, user_agent: Option<&'a str>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, kind: &'a str, id: String) -> Self {
        self.resource_type = Some(kind);
        self.resource_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    #[must_use]
    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    #[must_use]
    pub fn user(&self) -> Option<Uuid> {
        self.user_id
    }

    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }
}

/// One row of a user's recent authentication history.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginHistoryRow {
    pub action: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    pool: PgPool,
}

impl AuditLog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one audit row. Failures are logged and swallowed.
    pub async fn record(&self, event: AuditEvent<'_>) {
        let query = "INSERT INTO audit_logs \
             (user_id, action, resource_type, resource_id, ip_address, user_agent, status, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        if let Err(err) = sqlx::query(query)
            .bind(event.user_id)
            .bind(event.action.as_str())
            .bind(event.resource_type)
            .bind(event.resource_id)
            .bind(event.ip_address)
            .bind(event.user_agent)
            .bind(event.outcome.as_str())
            .bind(event.metadata)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            error!(
                "Failed to record audit event {}: {err}",
                event.action.as_str()
            );
        }
    }

    /// Recent login and login-failure events for one user, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn login_history(&self, user_id: Uuid, limit: i64) -> Result<Vec<LoginHistoryRow>> {
        let query = "SELECT action, status, ip_address, user_agent, created_at \
             FROM audit_logs \
             WHERE user_id = $1 AND action IN ('login', 'login_failed', 'brute_force_block') \
             ORDER BY created_at DESC LIMIT $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, LoginHistoryRow>(query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to read login history")
    }

    /// Drops audit rows older than the retention horizon.
    ///
    /// # Errors
    /// Returns an error if the database delete fails.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < NOW() - $1::interval")
            .bind(format!("{days} days"))
            .execute(&self.pool)
            .await
            .context("failed to prune audit logs")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_to_snake_case() {
        assert_eq!(AuditAction::Login.as_str(), "login");
        assert_eq!(AuditAction::LoginFailed.as_str(), "login_failed");
        assert_eq!(AuditAction::LogoutAll.as_str(), "logout_all");
        assert_eq!(AuditAction::BruteForceBlock.as_str(), "brute_force_block");
        assert_eq!(
            AuditAction::TokenReuseDetected.as_str(),
            "token_reuse_detected"
        );
    }

    #[test]
    fn events_default_to_success_with_no_subject() {
        let event = AuditEvent::new(AuditAction::Logout);
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert!(event.user_id.is_none());
        assert!(event.metadata.is_none());
    }

    #[test]
    fn builders_attach_subject_and_metadata() {
        let user_id = Uuid::new_v4();
        let event = AuditEvent::new(AuditAction::TokenReuseDetected)
            .with_user(user_id)
            .with_client(Some("203.0.113.9"), Some("curl/8"))
            .with_outcome(AuditOutcome::Blocked)
            .with_metadata(serde_json::json!({"severity": "high"}));
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.ip_address, Some("203.0.113.9"));
        assert_eq!(event.outcome, AuditOutcome::Blocked);
        assert_eq!(
            event.metadata,
            Some(serde_json::json!({"severity": "high"}))
        );
    }
}
