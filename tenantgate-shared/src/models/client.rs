/// OAuth2 client model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE oauth_clients (
///     id VARCHAR(64) PRIMARY KEY,
///     secret_hash VARCHAR(64) NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     redirect_uris TEXT[] NOT NULL DEFAULT '{}',
///     grant_types TEXT[] NOT NULL,
///     scopes TEXT[] NOT NULL DEFAULT '{}',
///     user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     tenant_id UUID REFERENCES tenants(id) ON DELETE SET NULL,
///     active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// The secret is stored as a SHA-256 hex digest; the plaintext is returned
/// once at registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

/// A registered OAuth2 client application
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    /// Public identifier (`cli_...`)
    pub id: String,

    #[serde(skip_serializing, default)]
    pub secret_hash: String,

    pub name: String,

    pub redirect_uris: Vec<String>,

    /// Grant types this client may use
    pub grant_types: Vec<String>,

    /// Scopes this client may be granted
    pub scopes: Vec<String>,

    /// Identity that registered the client, used for client_credentials
    pub user_id: Option<Uuid>,

    /// Tenant bound into client_credentials tokens
    pub tenant_id: Option<Uuid>,

    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }
}

/// Input for registering a client
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub id: String,
    pub secret_hash: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub scopes: Vec<String>,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
}

impl Client {
    pub async fn create<'e, E>(executor: E, data: &CreateClient) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO oauth_clients
                (id, secret_hash, name, redirect_uris, grant_types, scopes, user_id, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, secret_hash, name, redirect_uris, grant_types, scopes,
                      user_id, tenant_id, active, created_at, updated_at
            "#,
        )
        .bind(&data.id)
        .bind(&data.secret_hash)
        .bind(&data.name)
        .bind(&data.redirect_uris)
        .bind(&data.grant_types)
        .bind(&data.scopes)
        .bind(data.user_id)
        .bind(data.tenant_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, secret_hash, name, redirect_uris, grant_types, scopes,
                   user_id, tenant_id, active, created_at, updated_at
            FROM oauth_clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_grant() {
        let client = Client {
            id: "cli_test".to_string(),
            secret_hash: String::new(),
            name: "Test".to_string(),
            redirect_uris: vec![],
            grant_types: vec!["password".to_string(), "refresh_token".to_string()],
            scopes: vec!["read".to_string()],
            user_id: None,
            tenant_id: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(client.allows_grant("password"));
        assert!(client.allows_grant("refresh_token"));
        assert!(!client.allows_grant("client_credentials"));

        let json = serde_json::to_value(&client).unwrap();
        assert!(json.get("secret_hash").is_none());
    }
}
