//! Append-only login attempt history.
//!
//! Every login outcome is recorded here for correlation by email or source
//! address. The history is observational; lockout decisions read the counter
//! on the user row instead.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{Instrument, error};

/// Recorded when the client address could not be determined.
pub const UNKNOWN_IP: &str = "0.0.0.0";

#[derive(Debug, Clone)]
pub struct AttemptStore {
    pool: PgPool,
}

impl AttemptStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one attempt row. Failures are logged and swallowed so history
    /// writes can never block a login.
    pub async fn record(&self, email: &str, ip: Option<&str>, success: bool, user_agent: Option<&str>) {
        let query = "INSERT INTO login_attempts (email, ip_address, success, user_agent) \
             VALUES ($1, $2, $3, $4)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        if let Err(err) = sqlx::query(query)
            .bind(email)
            .bind(ip.unwrap_or(UNKNOWN_IP))
            .bind(success)
            .bind(user_agent)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            error!("Failed to record login attempt: {err}");
        }
    }

    /// Counts failed attempts for an email inside the rolling window. Used
    /// for correlation in audit metadata, not for the lockout decision.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn count_recent_failures(&self, email: &str, window_minutes: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM login_attempts \
             WHERE email = $1 AND success = FALSE AND created_at > NOW() - $2::interval",
        )
        .bind(email)
        .bind(format!("{window_minutes} minutes"))
        .fetch_one(&self.pool)
        .await
        .context("failed to count recent login failures")
    }

    /// Drops attempt rows older than the retention horizon.
    ///
    /// # Errors
    /// Returns an error if the database delete fails.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM login_attempts WHERE created_at < NOW() - $1::interval",
        )
        .bind(format!("{days} days"))
        .execute(&self.pool)
        .await
        .context("failed to prune login attempts")?;
        Ok(result.rows_affected())
    }
}
