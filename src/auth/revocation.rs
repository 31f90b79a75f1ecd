//! Access token revocation, cached in Redis and durable in `PostgreSQL`.
//!
//! The blacklist row is written inside the same transaction as the session
//! change that caused it; the cache entry is written after commit so a
//! rolled-back revocation never poisons the cache. Reads go cache first,
//! then fall through to the durable store and repopulate the key they
//! missed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Instrument, error, warn};
use uuid::Uuid;

use crate::auth::models::RevocationEntry;

fn revocation_key(jti: Uuid) -> String {
    format!("revoked:{jti}")
}

/// Cache TTL for a revocation entry, clamped so an already-expired token
/// still gets a visible key for one second.
fn remaining_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((expires_at - now).num_seconds()).unwrap_or(0).max(1)
}

#[derive(Clone)]
pub struct RevocationStore {
    cache: redis::Client,
    pool: PgPool,
    fail_open: bool,
}

impl RevocationStore {
    #[must_use]
    pub fn new(cache: redis::Client, pool: PgPool, fail_open: bool) -> Self {
        Self {
            cache,
            pool,
            fail_open,
        }
    }

    /// Writes the durable blacklist row inside the caller's transaction.
    /// Replays of the same `jti` are no-ops. The cache is deliberately not
    /// touched here; call [`RevocationStore::cache_revocations`] after
    /// commit.
    ///
    /// # Errors
    /// Returns an error if the database insert fails.
    pub async fn revoke(
        tx: &mut Transaction<'_, Postgres>,
        entry: &RevocationEntry,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO token_blacklist (jti, user_id, token_hash, reason, expires_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (jti) DO NOTHING",
        )
        .bind(entry.jti)
        .bind(entry.user_id)
        .bind(&entry.token_hash)
        .bind(entry.reason.as_str())
        .bind(entry.expires_at)
        .execute(&mut **tx)
        .await
        .context("failed to insert blacklist entry")?;
        Ok(())
    }

    /// Mirrors committed revocations into the cache. Best-effort: the
    /// durable store already holds the truth, so cache failures only cost a
    /// fallthrough on later reads.
    pub async fn cache_revocations(&self, entries: &[(Uuid, DateTime<Utc>)]) {
        let mut conn = match self.cache.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("revocation cache unavailable: {err}");
                return;
            }
        };
        let now = Utc::now();
        for (jti, expires_at) in entries {
            if let Err(err) = conn
                .set_ex::<_, _, ()>(revocation_key(*jti), 1, remaining_ttl(*expires_at, now))
                .await
            {
                warn!("failed to cache revocation for {jti}: {err}");
            }
        }
    }

    /// Checks whether `jti` has been revoked.
    ///
    /// Cache errors degrade to a durable-store read. A durable-store error
    /// is infrastructure failure and propagates, unless the store was built
    /// fail-open, in which case the token is accepted and the error logged.
    ///
    /// # Errors
    /// Returns an error if the durable store is unreachable and fail-open is
    /// disabled.
    pub async fn is_revoked(&self, jti: Uuid) -> Result<bool> {
        match self.cache_lookup(jti).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) => warn!("revocation cache read failed: {err}"),
        }

        match self.durable_lookup(jti).await {
            Ok(Some(expires_at)) => {
                self.cache_revocations(&[(jti, expires_at)]).await;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) if self.fail_open => {
                error!("revocation store unreachable, accepting token {jti}: {err:#}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Round-trip liveness check against the cache.
    ///
    /// # Errors
    /// Returns an error if the PING fails.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self
            .cache
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to revocation cache")?;
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .context("revocation cache did not answer PING")?;
        Ok(())
    }

    /// Drops blacklist rows whose tokens have expired on their own.
    ///
    /// # Errors
    /// Returns an error if the database delete fails.
    pub async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .context("failed to prune blacklist")?;
        Ok(result.rows_affected())
    }

    async fn cache_lookup(&self, jti: Uuid) -> Result<bool> {
        let mut conn = self
            .cache
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to revocation cache")?;
        let hit: Option<i64> = conn
            .get(revocation_key(jti))
            .await
            .context("failed to read revocation key")?;
        Ok(hit.is_some())
    }

    async fn durable_lookup(&self, jti: Uuid) -> Result<Option<DateTime<Utc>>> {
        let query = "SELECT expires_at FROM token_blacklist WHERE jti = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read blacklist entry")?;
        Ok(row.map(|row| row.get("expires_at")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cache_keys_are_namespaced_by_jti() {
        let jti = Uuid::new_v4();
        assert_eq!(revocation_key(jti), format!("revoked:{jti}"));
    }

    #[test]
    fn ttl_tracks_remaining_lifetime_with_a_floor() {
        let now = Utc::now();
        assert_eq!(remaining_ttl(now + Duration::seconds(900), now), 900);
        assert_eq!(remaining_ttl(now, now), 1);
        assert_eq!(remaining_ttl(now - Duration::hours(1), now), 1);
    }
}
