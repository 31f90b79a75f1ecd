//! Failed-login counting and temporary account lockout.
//!
//! The counter lives on the user row and every transition happens in one
//! conditional UPDATE, so concurrent failures cannot lose increments the way
//! a read-modify-write would. Rules, in order:
//!
//! * an active lock leaves the row untouched
//! * a failure outside the rolling window restarts the count at one
//! * a failure inside the window increments, and reaching the maximum zeroes
//!   the counter and stamps `locked_until`
//!
//! Scaling: state is in `PostgreSQL`, so limits hold across replicas.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::config::AuthConfig;

const REGISTER_FAILURE_SQL: &str = r"
    UPDATE users SET
        failed_login_attempts = CASE
            WHEN locked_until IS NOT NULL AND locked_until > NOW()
                THEN failed_login_attempts
            WHEN last_failed_login_at IS NULL
                OR last_failed_login_at < NOW() - $2::interval
                THEN CASE WHEN $3 <= 1 THEN 0 ELSE 1 END
            WHEN failed_login_attempts + 1 >= $3 THEN 0
            ELSE failed_login_attempts + 1
        END,
        locked_until = CASE
            WHEN locked_until IS NOT NULL AND locked_until > NOW()
                THEN locked_until
            WHEN (last_failed_login_at IS NULL
                OR last_failed_login_at < NOW() - $2::interval)
                THEN CASE WHEN $3 <= 1 THEN NOW() + $4::interval ELSE NULL END
            WHEN failed_login_attempts + 1 >= $3 THEN NOW() + $4::interval
            ELSE NULL
        END,
        last_failed_login_at = CASE
            WHEN locked_until IS NOT NULL AND locked_until > NOW()
                THEN last_failed_login_at
            ELSE NOW()
        END,
        updated_at = NOW()
    WHERE id = $1
    RETURNING locked_until IS NOT NULL AND locked_until > NOW() AS locked
";

#[derive(Debug, Clone)]
pub struct LockoutGuard {
    pool: PgPool,
    max_attempts: i32,
    window_minutes: i64,
    lock_minutes: i64,
}

impl LockoutGuard {
    #[must_use]
    pub fn new(pool: PgPool, config: &AuthConfig) -> Self {
        Self {
            pool,
            max_attempts: config.max_login_attempts(),
            window_minutes: config.attempt_window_minutes(),
            lock_minutes: config.lock_duration_minutes(),
        }
    }

    /// Registers one failed login and reports whether the account is locked
    /// afterwards. With a maximum of one attempt the very first failure
    /// locks.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn register_failure(&self, user_id: Uuid) -> Result<bool> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let row = sqlx::query(REGISTER_FAILURE_SQL)
            .bind(user_id)
            .bind(format!("{} minutes", self.window_minutes))
            .bind(self.max_attempts)
            .bind(format!("{} minutes", self.lock_minutes))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to register login failure")?;

        Ok(row.is_some_and(|row| row.get("locked")))
    }

    /// Clears counter, window stamp, and any expired lock after a successful
    /// login. Callers skip this when the row carries no lockout state.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn reset(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, last_failed_login_at = NULL, \
             locked_until = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to reset lockout state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized() -> String {
        REGISTER_FAILURE_SQL
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn active_lock_guards_every_column_transition() {
        let sql = normalized();
        // Counter, lock, and window stamp each leave the row untouched while
        // a lock is active.
        assert_eq!(
            sql.matches("WHEN locked_until IS NOT NULL AND locked_until > NOW()")
                .count(),
            3
        );
    }

    #[test]
    fn failures_outside_the_window_restart_the_count() {
        let sql = normalized();
        assert!(sql.contains("last_failed_login_at < NOW() - $2::interval"));
        assert!(sql.contains("THEN CASE WHEN $3 <= 1 THEN 0 ELSE 1 END"));
    }

    #[test]
    fn reaching_the_maximum_zeroes_the_counter_and_locks() {
        let sql = normalized();
        assert!(sql.contains("WHEN failed_login_attempts + 1 >= $3 THEN 0"));
        assert!(sql.contains("WHEN failed_login_attempts + 1 >= $3 THEN NOW() + $4::interval"));
    }

    #[test]
    fn a_single_attempt_maximum_locks_on_the_first_failure() {
        let sql = normalized();
        assert!(sql.contains("CASE WHEN $3 <= 1 THEN NOW() + $4::interval ELSE NULL END"));
    }

    #[test]
    fn the_update_reports_the_resulting_lock_state() {
        let sql = normalized();
        assert!(sql.ends_with("RETURNING locked_until IS NOT NULL AND locked_until > NOW() AS locked"));
    }
}
