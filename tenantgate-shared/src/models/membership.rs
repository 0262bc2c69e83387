/// Membership model and database operations
///
/// A membership links an identity to a tenant with a role. At most one
/// membership per identity carries `is_default`; the partial unique index
/// below enforces it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE memberships (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     role VARCHAR(32) NOT NULL DEFAULT 'member',
///     is_default BOOLEAN NOT NULL DEFAULT FALSE,
///     active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT memberships_user_tenant_key UNIQUE (user_id, tenant_id)
/// );
///
/// CREATE UNIQUE INDEX memberships_one_default_per_user
///     ON memberships(user_id) WHERE is_default;
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::auth::claims::TenantContext;

/// Role names
pub mod role {
    pub const OWNER: &str = "owner";
    pub const ADMIN: &str = "admin";
    pub const MEMBER: &str = "member";
}

/// Returns true if the role may add and remove members
pub fn can_manage_members(role: &str) -> bool {
    role == role::OWNER || role == role::ADMIN
}

/// An identity-tenant association
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub is_default: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A membership joined with the fields of its tenant that resolution needs
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantMembership {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub role: String,
    pub is_default: bool,
    pub active: bool,
    pub tenant_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TenantMembership {
    /// Both the membership and its tenant are active
    pub fn is_usable(&self) -> bool {
        self.active && self.tenant_active
    }

    pub fn context(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.tenant_id,
            tenant_name: self.tenant_name.clone(),
            role: self.role.clone(),
        }
    }
}

/// Input for creating or updating a membership
#[derive(Debug, Clone)]
pub struct UpsertMembership {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub is_default: bool,
}

const JOINED_COLUMNS: &str = r#"
    m.user_id, m.tenant_id, t.name AS tenant_name, m.role, m.is_default,
    m.active, t.active AS tenant_active, m.created_at
"#;

impl Membership {
    /// Inserts a membership, or updates the role of an existing one
    ///
    /// An existing membership is reactivated but keeps its default flag.
    pub async fn upsert<'e, E>(executor: E, data: &UpsertMembership) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, tenant_id, role, is_default)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, tenant_id)
            DO UPDATE SET role = EXCLUDED.role, active = TRUE, updated_at = NOW()
            RETURNING id, user_id, tenant_id, role, is_default, active, created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.tenant_id)
        .bind(&data.role)
        .bind(data.is_default)
        .fetch_one(executor)
        .await
    }

    pub async fn find_with_tenant<'e, E>(
        executor: E,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantMembership>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM memberships m \
             JOIN tenants t ON t.id = m.tenant_id \
             WHERE m.user_id = $1 AND m.tenant_id = $2"
        );

        sqlx::query_as::<_, TenantMembership>(&sql)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_default_with_tenant<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<TenantMembership>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM memberships m \
             JOIN tenants t ON t.id = m.tenant_id \
             WHERE m.user_id = $1 AND m.is_default"
        );

        sqlx::query_as::<_, TenantMembership>(&sql)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Lists every membership of a user, oldest first
    pub async fn list_by_user_with_tenant<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<TenantMembership>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM memberships m \
             JOIN tenants t ON t.id = m.tenant_id \
             WHERE m.user_id = $1 \
             ORDER BY m.created_at, m.tenant_id"
        );

        sqlx::query_as::<_, TenantMembership>(&sql)
            .bind(user_id)
            .fetch_all(executor)
            .await
    }

    /// Serializes membership changes of a user for the rest of the transaction
    ///
    /// Locks the user row rather than the membership rows, which may not
    /// exist yet.
    pub async fn lock_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_all(executor)
            .await?;
        Ok(())
    }

    pub async fn clear_default<'e, E>(executor: E, user_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE memberships
            SET is_default = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND is_default
            "#,
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Marks one membership as default
    ///
    /// Returns false if the membership does not exist. Callers clear the
    /// previous default first.
    pub async fn set_default<'e, E>(
        executor: E,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE memberships
            SET is_default = TRUE, updated_at = NOW()
            WHERE user_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete<'e, E>(
        executor: E,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            DELETE FROM memberships
            WHERE user_id = $1 AND tenant_id = $2
            RETURNING id, user_id, tenant_id, role, is_default, active, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
    }

    /// Finds the oldest usable membership of a user
    pub async fn find_oldest_usable<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<TenantMembership>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM memberships m \
             JOIN tenants t ON t.id = m.tenant_id \
             WHERE m.user_id = $1 AND m.active AND t.active \
             ORDER BY m.created_at, m.tenant_id \
             LIMIT 1"
        );

        sqlx::query_as::<_, TenantMembership>(&sql)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }
}
