//! Refresh token persistence and the locked reads behind rotation.
//!
//! Rotation serializes on the token row: the presented secret's row is read
//! `FOR UPDATE` under a statement-scoped lock timeout, so a concurrent
//! rotation of the same secret surfaces as lock contention instead of a
//! double-spend. Revoked rows are kept until natural expiry because reuse
//! detection needs them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::models::RefreshRecord;

const REFRESH_COLUMNS: &str = "id, user_id, token_hash, jti, family_id, expires_at, \
     revoked, revoked_at, replaced_by_jti, user_agent, ip_address, created_at";

const DELETE_EXPIRED_SQL: &str =
    "DELETE FROM refresh_tokens WHERE expires_at < NOW() - INTERVAL '7 days'";

/// SQLSTATE 55P03 is `lock_not_available`, 57014 is `query_canceled`; both
/// mean another rotation holds the row.
fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == "55P03" || code.as_ref() == "57014"),
        _ => false,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// `SET` cannot take bind parameters, so the timeout is formatted in. The
/// value is always a config-supplied integer.
fn lock_timeout_statement(timeout_ms: u64) -> String {
    format!("SET LOCAL lock_timeout = '{timeout_ms}ms'")
}

/// Outcome of inserting a freshly minted secret.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted,
    /// The secret hash collided with an existing row; mint again.
    DuplicateHash,
}

/// Fields for a refresh row about to be written. The row id comes from the
/// database default.
#[derive(Debug)]
pub struct NewRefreshToken<'a> {
    pub user_id: Uuid,
    pub token_hash: &'a str,
    pub jti: Uuid,
    pub family_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}

pub struct RotationStore;

impl RotationStore {
    /// Inserts a refresh row inside the caller's transaction.
    ///
    /// # Errors
    /// Returns an error if the database insert fails for any reason other
    /// than a duplicate secret hash.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        token: &NewRefreshToken<'_>,
    ) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO refresh_tokens
                (user_id, token_hash, jti, family_id, expires_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let result = sqlx::query(query)
            .bind(token.user_id)
            .bind(token.token_hash)
            .bind(token.jti)
            .bind(token.family_id)
            .bind(token.expires_at)
            .bind(token.user_agent)
            .bind(token.ip_address)
            .execute(&mut **tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::DuplicateHash),
            Err(err) => Err(err).context("failed to insert refresh token"),
        }
    }

    /// Reads the row for a presented secret and locks it for the rest of the
    /// transaction.
    ///
    /// # Errors
    /// `AuthError::RefreshInProgress` when another transaction holds the row
    /// past the lock timeout, `AuthError::Internal` for other failures.
    pub async fn find_by_hash_for_update(
        tx: &mut Transaction<'_, Postgres>,
        token_hash: &str,
        lock_timeout_ms: u64,
    ) -> Result<Option<RefreshRecord>, AuthError> {
        sqlx::query(&lock_timeout_statement(lock_timeout_ms))
            .execute(&mut **tx)
            .await
            .context("failed to scope lock timeout")?;

        let query = format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query_as::<_, RefreshRecord>(&query)
            .bind(token_hash)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await;

        match row {
            Ok(record) => Ok(record),
            Err(err) if is_lock_contention(&err) => Err(AuthError::RefreshInProgress),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to lock refresh token row")
                .into()),
        }
    }

    /// Marks a rotated-out row revoked and points it at its successor.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn mark_rotated(
        tx: &mut Transaction<'_, Postgres>,
        jti: Uuid,
        replaced_by_jti: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = NOW(), \
             replaced_by_jti = $2 WHERE jti = $1",
        )
        .bind(jti)
        .bind(replaced_by_jti)
        .execute(&mut **tx)
        .await
        .context("failed to mark refresh token rotated")?;
        Ok(())
    }

    /// Revokes the row for a presented secret, returning it when it was
    /// still live. `None` means the secret is unknown or already revoked.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn revoke_by_hash(
        tx: &mut Transaction<'_, Postgres>,
        token_hash: &str,
    ) -> Result<Option<RefreshRecord>> {
        let query = format!(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = NOW() \
             WHERE token_hash = $1 AND revoked = FALSE RETURNING {REFRESH_COLUMNS}"
        );
        sqlx::query_as::<_, RefreshRecord>(&query)
            .bind(token_hash)
            .fetch_optional(&mut **tx)
            .await
            .context("failed to revoke refresh token")
    }

    /// Revokes one of a user's sessions by row id. `None` means no live
    /// session matched.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn revoke_by_id(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<RefreshRecord>> {
        let query = format!(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = NOW() \
             WHERE id = $2 AND user_id = $1 AND revoked = FALSE AND expires_at > NOW() \
             RETURNING {REFRESH_COLUMNS}"
        );
        sqlx::query_as::<_, RefreshRecord>(&query)
            .bind(user_id)
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await
            .context("failed to revoke session")
    }

    /// Revokes every live session of a user, returning `(jti, token_hash,
    /// expires_at)` per row for blacklisting the paired access tokens.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn revoke_all_for_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<Vec<(Uuid, String, DateTime<Utc>)>> {
        sqlx::query_as::<_, (Uuid, String, DateTime<Utc>)>(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = NOW() \
             WHERE user_id = $1 AND revoked = FALSE AND expires_at > NOW() \
             RETURNING jti, token_hash, expires_at",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .context("failed to revoke user sessions")
    }

    /// Revokes every live descendant of a token family after reuse was
    /// detected.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn revoke_family(
        tx: &mut Transaction<'_, Postgres>,
        family_id: Uuid,
    ) -> Result<Vec<(Uuid, String, DateTime<Utc>)>> {
        sqlx::query_as::<_, (Uuid, String, DateTime<Utc>)>(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = NOW() \
             WHERE family_id = $1 AND revoked = FALSE AND expires_at > NOW() \
             RETURNING jti, token_hash, expires_at",
        )
        .bind(family_id)
        .fetch_all(&mut **tx)
        .await
        .context("failed to revoke token family")
    }

    /// Lists a user's live sessions, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_active(pool: &PgPool, user_id: Uuid) -> Result<Vec<RefreshRecord>> {
        let query = format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens \
             WHERE user_id = $1 AND revoked = FALSE AND expires_at > NOW() \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, RefreshRecord>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("failed to list sessions")
    }

    /// Drops rows more than seven days past expiry. The grace period keeps
    /// freshly expired rows, revoked ones included, available for
    /// reuse-detection forensics.
    ///
    /// # Errors
    /// Returns an error if the database delete fails.
    pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(DELETE_EXPIRED_SQL)
            .execute(pool)
            .await
            .context("failed to prune refresh tokens")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code: Some(code) }))
    }

    #[test]
    fn lock_contention_matches_both_sqlstates() {
        assert!(is_lock_contention(&db_error("55P03")));
        assert!(is_lock_contention(&db_error("57014")));
        assert!(!is_lock_contention(&db_error("23505")));
        assert!(!is_lock_contention(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        assert!(is_unique_violation(&db_error("23505")));
        assert!(!is_unique_violation(&db_error("55P03")));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn lock_timeout_is_statement_scoped() {
        assert_eq!(
            lock_timeout_statement(2_000),
            "SET LOCAL lock_timeout = '2000ms'"
        );
    }

    #[test]
    fn pruning_keeps_a_seven_day_forensics_window() {
        assert!(DELETE_EXPIRED_SQL.contains("expires_at < NOW() - INTERVAL '7 days'"));
    }
}
