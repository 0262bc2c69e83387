/// Tenant model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
///     active BOOLEAN NOT NULL DEFAULT TRUE,
///     settings JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT tenants_name_key UNIQUE (name)
/// );
/// ```
///
/// A tenant is always created together with its owner's membership; see
/// [`crate::store::TenantStore::create_tenant_with_owner`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

/// Unique constraint on `tenants.name`
pub const NAME_UNIQUE_CONSTRAINT: &str = "tenants_name_key";

/// A named organizational boundary
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    /// Unique tenant ID (UUID v4)
    pub id: Uuid,

    /// Unique display name
    pub name: String,

    /// Identity that created the tenant
    pub owner_id: Uuid,

    /// Inactive tenants cannot be bound into tokens
    pub active: bool,

    /// Opaque tenant configuration
    pub settings: JsonValue,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new tenant
#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,

    pub owner_id: Uuid,

    /// Defaults to `{}` when `None`
    pub settings: Option<JsonValue>,
}

impl Tenant {
    /// Inserts a tenant
    ///
    /// Fails with a unique violation on [`NAME_UNIQUE_CONSTRAINT`] if the
    /// name is taken.
    pub async fn create<'e, E>(executor: E, data: &CreateTenant) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, owner_id, settings)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_id, active, settings, created_at, updated_at
            "#,
        )
        .bind(data.name.trim())
        .bind(data.owner_id)
        .bind(
            data.settings
                .clone()
                .unwrap_or_else(|| JsonValue::Object(Default::default())),
        )
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, owner_id, active, settings, created_at, updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}
