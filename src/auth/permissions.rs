use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// Source of permission codes granted to a role. Access tokens embed the
/// codes at issuance time, so lookups happen on login and refresh only.
#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    async fn codes_for_role(&self, role: &str) -> Result<Vec<String>>;
}

/// Role to permission mapping backed by the relational catalog.
pub struct PgPermissionDirectory {
    pool: PgPool,
}

impl PgPermissionDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionDirectory for PgPermissionDirectory {
    async fn codes_for_role(&self, role: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r"
            SELECT p.code
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role = $1
            ORDER BY p.code
            ",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await
        .context("failed to load permissions for role")
    }
}
