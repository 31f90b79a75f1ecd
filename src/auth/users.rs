use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::models::User;

const USER_COLUMNS: &str = "id, email, password_hash, role, status, \
     failed_login_attempts, last_failed_login_at, locked_until, created_at, updated_at";

pub struct UserStore;

impl UserStore {
    /// Looks up a user by email. Callers normalize the address first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")
    }

    /// Id lookup, usable on the pool or inside a transaction.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_by_id<'e>(
        executor: impl sqlx::PgExecutor<'e>,
        user_id: Uuid,
    ) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
            .context("failed to lookup user by id")
    }

    /// Replaces the stored password hash inside the caller's transaction so
    /// the swap commits together with the session revocations.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn update_password(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut **tx)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }
}
