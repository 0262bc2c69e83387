//! Token introspection and revocation
//!
//! Introspection answers for opaque access tokens only. Anything that is not
//! a live access token (unknown, revoked, expired, or a refresh token) is
//! reported as `{"active": false}` and nothing else.
//!
//! Revocation only touches tokens issued to the calling client, tries both
//! token tables (the hint only picks the order) and succeeds whether or not
//! anything was revoked.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::OAuthError;
use crate::auth::secret::hash_secret;
use crate::models::client::Client;
use crate::store::CredentialStore;

/// Form body of `POST /oauth/introspect` and `POST /oauth/revoke`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenLookupRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

impl TokenLookupRequest {
    pub fn token(&self) -> Result<&str, OAuthError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("token is required".to_string()))
    }

    /// Unrecognized hints are ignored
    pub fn hint(&self) -> Option<TokenTypeHint> {
        self.token_type_hint.as_deref().and_then(|h| h.parse().ok())
    }
}

/// Introspection response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introspection {
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self {
            active: false,
            client_id: None,
            exp: None,
            iat: None,
            scope: None,
            user_id: None,
            tenant_id: None,
        }
    }
}

/// `token_type_hint` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl FromStr for TokenTypeHint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(TokenTypeHint::AccessToken),
            "refresh_token" => Ok(TokenTypeHint::RefreshToken),
            _ => Err(()),
        }
    }
}

/// Reports whether `token` is a live access token
pub async fn introspect<S>(store: &S, token: &str) -> Result<Introspection, OAuthError>
where
    S: CredentialStore + ?Sized,
{
    let record = match store.find_access_token(&hash_secret(token)).await? {
        Some(record) if record.is_valid_at(Utc::now()) => record,
        _ => {
            debug!("Introspected token is not active");
            return Ok(Introspection::inactive());
        }
    };

    Ok(Introspection {
        active: true,
        client_id: Some(record.client_id),
        exp: Some(record.expires_at.timestamp()),
        iat: Some(record.created_at.timestamp()),
        scope: Some(record.scope),
        user_id: record.user_id,
        tenant_id: record.tenant_id,
    })
}

/// Revokes `token` if it was issued to `client`
///
/// Never reports whether a token was found.
pub async fn revoke<S>(
    store: &S,
    client: &Client,
    token: &str,
    hint: Option<TokenTypeHint>,
) -> Result<(), OAuthError>
where
    S: CredentialStore + ?Sized,
{
    let token_hash = hash_secret(token);
    let order = match hint {
        Some(TokenTypeHint::RefreshToken) => [TokenTypeHint::RefreshToken, TokenTypeHint::AccessToken],
        _ => [TokenTypeHint::AccessToken, TokenTypeHint::RefreshToken],
    };

    for kind in order {
        let revoked = match kind {
            TokenTypeHint::AccessToken => store.revoke_access_token(&token_hash, &client.id).await?,
            TokenTypeHint::RefreshToken => store.revoke_refresh_token(&token_hash, &client.id).await?,
        };

        if revoked {
            info!(client_id = %client.id, kind = ?kind, "Token revoked");
            return Ok(());
        }
    }

    debug!(client_id = %client.id, "Revocation matched no token");
    Ok(())
}
