/// Opaque OAuth2 token models and database operations
///
/// Tokens are looked up by the SHA-256 hex digest of their plaintext; the
/// plaintext only ever exists in the issuance response.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE oauth_access_tokens (
///     id VARCHAR(64) PRIMARY KEY,
///     token_hash VARCHAR(64) NOT NULL,
///     client_id VARCHAR(64) NOT NULL REFERENCES oauth_clients(id) ON DELETE CASCADE,
///     user_id UUID REFERENCES users(id) ON DELETE CASCADE,
///     tenant_id UUID REFERENCES tenants(id) ON DELETE CASCADE,
///     scope TEXT NOT NULL DEFAULT '',
///     expires_at TIMESTAMPTZ NOT NULL,
///     revoked BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT oauth_access_tokens_token_hash_key UNIQUE (token_hash)
/// );
///
/// CREATE TABLE oauth_refresh_tokens (
///     id VARCHAR(64) PRIMARY KEY,
///     token_hash VARCHAR(64) NOT NULL,
///     access_token_id VARCHAR(64) NOT NULL REFERENCES oauth_access_tokens(id) ON DELETE CASCADE,
///     client_id VARCHAR(64) NOT NULL REFERENCES oauth_clients(id) ON DELETE CASCADE,
///     user_id UUID REFERENCES users(id) ON DELETE CASCADE,
///     tenant_id UUID REFERENCES tenants(id) ON DELETE CASCADE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     revoked BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT oauth_refresh_tokens_token_hash_key UNIQUE (token_hash)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::auth::scope::parse_scope;

/// A stored access token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub id: String,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub client_id: String,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    /// Space-separated granted scopes
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Not revoked and `now` is strictly before expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    pub fn scopes(&self) -> Vec<String> {
        parse_scope(&self.scope)
    }
}

/// A stored refresh token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: String,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub access_token_id: String,
    pub client_id: String,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Who a token pair is issued to
///
/// client_credentials pairs carry neither identity nor tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub client_id: String,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub scope: String,
}

/// Identifiers, digests and expiries for a pair about to be stored
#[derive(Debug, Clone)]
pub struct PendingTokenPair {
    pub access_id: String,
    pub access_token_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_id: String,
    pub refresh_token_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// A stored access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

const ACCESS_COLUMNS: &str =
    "id, token_hash, client_id, user_id, tenant_id, scope, expires_at, revoked, created_at";

const REFRESH_COLUMNS: &str = "id, token_hash, access_token_id, client_id, user_id, tenant_id, \
     expires_at, revoked, created_at";

impl AccessToken {
    pub async fn create<'e, E>(
        executor: E,
        grant: &TokenGrant,
        pending: &PendingTokenPair,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "INSERT INTO oauth_access_tokens \
                 (id, token_hash, client_id, user_id, tenant_id, scope, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ACCESS_COLUMNS}"
        );

        sqlx::query_as::<_, AccessToken>(&sql)
            .bind(&pending.access_id)
            .bind(&pending.access_token_hash)
            .bind(&grant.client_id)
            .bind(grant.user_id)
            .bind(grant.tenant_id)
            .bind(&grant.scope)
            .bind(pending.access_expires_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_hash<'e, E>(executor: E, token_hash: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("SELECT {ACCESS_COLUMNS} FROM oauth_access_tokens WHERE token_hash = $1");

        sqlx::query_as::<_, AccessToken>(&sql)
            .bind(token_hash)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("SELECT {ACCESS_COLUMNS} FROM oauth_access_tokens WHERE id = $1");

        sqlx::query_as::<_, AccessToken>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Revokes the token if it belongs to `client_id`
    ///
    /// Returns false when no such token exists for that client.
    pub async fn revoke_for_client<'e, E>(
        executor: E,
        token_hash: &str,
        client_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE oauth_access_tokens SET revoked = TRUE WHERE token_hash = $1 AND client_id = $2",
        )
        .bind(token_hash)
        .bind(client_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl RefreshToken {
    pub async fn create<'e, E>(
        executor: E,
        grant: &TokenGrant,
        pending: &PendingTokenPair,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "INSERT INTO oauth_refresh_tokens \
                 (id, token_hash, access_token_id, client_id, user_id, tenant_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {REFRESH_COLUMNS}"
        );

        sqlx::query_as::<_, RefreshToken>(&sql)
            .bind(&pending.refresh_id)
            .bind(&pending.refresh_token_hash)
            .bind(&pending.access_id)
            .bind(&grant.client_id)
            .bind(grant.user_id)
            .bind(grant.tenant_id)
            .bind(pending.refresh_expires_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_hash<'e, E>(executor: E, token_hash: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("SELECT {REFRESH_COLUMNS} FROM oauth_refresh_tokens WHERE token_hash = $1");

        sqlx::query_as::<_, RefreshToken>(&sql)
            .bind(token_hash)
            .fetch_optional(executor)
            .await
    }

    /// Atomically revokes a live refresh token owned by `client_id`
    ///
    /// Returns the token as it was before revocation, or `None` if it is
    /// unknown, belongs to another client, is already revoked or expired.
    /// Two concurrent calls with the same token cannot both succeed.
    pub async fn consume<'e, E>(
        executor: E,
        token_hash: &str,
        client_id: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE oauth_refresh_tokens SET revoked = TRUE \
             WHERE token_hash = $1 AND client_id = $2 AND NOT revoked AND expires_at > NOW() \
             RETURNING {REFRESH_COLUMNS}"
        );

        sqlx::query_as::<_, RefreshToken>(&sql)
            .bind(token_hash)
            .bind(client_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn revoke_for_client<'e, E>(
        executor: E,
        token_hash: &str,
        client_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE oauth_refresh_tokens SET revoked = TRUE WHERE token_hash = $1 AND client_id = $2",
        )
        .bind(token_hash)
        .bind(client_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
