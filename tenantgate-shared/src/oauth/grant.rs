//! Grant handler
//!
//! Turns an authenticated client plus a token request into an opaque
//! access/refresh token pair. Dispatch order:
//!
//! 1. a missing `grant_type` is `invalid_request`
//! 2. an unknown grant type is `unsupported_grant_type`
//! 3. a grant type outside the client's allow-list is `unauthorized_client`
//! 4. the grant branch runs
//!
//! Requested scopes are intersected with the client's allowed scopes;
//! unknown ones are dropped rather than rejected. Refresh tokens are single
//! use: the exchange revokes the presented token and mints a new pair with
//! the identity, tenant and scope of the original access token.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::OAuthError;
use crate::auth::password::verify_credentials;
use crate::auth::scope::{join_scopes, negotiate_scope};
use crate::auth::secret::{
    generate_id, generate_token, hash_secret, ACCESS_TOKEN_ID_PREFIX, REFRESH_TOKEN_ID_PREFIX,
};
use crate::models::client::Client;
use crate::models::token::{PendingTokenPair, TokenGrant, TokenPair};
use crate::store::{CredentialStore, IdentityStore, TenantStore};
use crate::tenancy::{TenancyError, TenantResolver};

/// Supported OAuth2 grant types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub const ALL: [GrantType; 3] = [
        GrantType::ClientCredentials,
        GrantType::Password,
        GrantType::RefreshToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| OAuthError::UnsupportedGrantType(format!("Grant type '{}' is not supported", s)))
    }
}

/// Form body of `POST /oauth/token`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub tenant_id: Option<String>,
}

/// Successful token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

/// Lifetimes of issued opaque tokens
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::hours(1),
            refresh: Duration::days(7),
        }
    }
}

/// Plaintext tokens plus what gets stored for them
struct MintedPair {
    access_token: String,
    refresh_token: String,
    pending: PendingTokenPair,
}

/// OAuth2 grant handler
///
/// The caller has already authenticated the client; the handler trusts the
/// [`Client`] it is given.
pub struct GrantHandler<S: ?Sized> {
    store: Arc<S>,
    tenants: TenantResolver<S>,
    lifetimes: TokenLifetimes,
}

impl<S> GrantHandler<S>
where
    S: IdentityStore + TenantStore + CredentialStore + ?Sized,
{
    pub fn new(store: Arc<S>, lifetimes: TokenLifetimes) -> Self {
        Self {
            tenants: TenantResolver::new(Arc::clone(&store)),
            store,
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Handles a token request for an authenticated client
    pub async fn handle(&self, client: &Client, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let grant_type = match request.grant_type.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.parse::<GrantType>()?,
            _ => return Err(OAuthError::InvalidRequest("grant_type is required".to_string())),
        };

        if !client.allows_grant(grant_type.as_str()) {
            warn!(client_id = %client.id, grant_type = %grant_type, "Grant type not allowed for client");
            return Err(OAuthError::UnauthorizedClient(format!(
                "Client is not allowed to use the {} grant",
                grant_type
            )));
        }

        let response = match grant_type {
            GrantType::ClientCredentials => self.client_credentials(client, &request).await?,
            GrantType::Password => self.password(client, &request).await?,
            GrantType::RefreshToken => self.refresh_token(client, &request).await?,
        };

        info!(client_id = %client.id, grant_type = %grant_type, "Tokens issued");
        Ok(response)
    }

    async fn client_credentials(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let scopes = negotiate_scope(&client.scopes, request.scope.as_deref());

        self.issue(TokenGrant {
            client_id: client.id.clone(),
            user_id: None,
            tenant_id: None,
            scope: join_scopes(&scopes),
        })
        .await
    }

    async fn password(&self, client: &Client, request: &TokenRequest) -> Result<TokenResponse, OAuthError> {
        let (username, password) = match (non_empty(&request.username), non_empty(&request.password)) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                return Err(OAuthError::InvalidRequest(
                    "username and password are required".to_string(),
                ))
            }
        };

        let requested_tenant = non_empty(&request.tenant_id)
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| OAuthError::InvalidRequest("tenant_id must be a valid UUID".to_string()))?;

        let user = self.store.find_user_by_email(username).await?;
        let verified = verify_credentials(password, user.as_ref().map(|u| u.password_hash.as_str()))
            .map_err(|e| {
                error!(error = %e, "Password verification failed");
                OAuthError::ServerError(e.to_string())
            })?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                warn!(client_id = %client.id, "Password grant rejected");
                return Err(OAuthError::InvalidGrant("Invalid username or password".to_string()));
            }
        };

        let tenant_id = match requested_tenant {
            Some(tenant_id) => {
                let context = self
                    .tenants
                    .resolve(user.id, Some(tenant_id))
                    .await
                    .map_err(tenancy_to_oauth)?
                    .into_context();
                context.map(|c| c.tenant_id)
            }
            None => None,
        };

        let scopes = negotiate_scope(&client.scopes, request.scope.as_deref());

        self.issue(TokenGrant {
            client_id: client.id.clone(),
            user_id: Some(user.id),
            tenant_id,
            scope: join_scopes(&scopes),
        })
        .await
    }

    async fn refresh_token(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let presented = non_empty(&request.refresh_token)
            .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;
        let token_hash = hash_secret(presented);

        let minted = self.mint();
        let pair = self
            .store
            .rotate_refresh_token(&token_hash, &client.id, minted.pending.clone())
            .await?
            .ok_or_else(|| {
                warn!(client_id = %client.id, "Refresh token rejected");
                invalid_refresh_token()
            })?;

        Ok(self.respond(minted, pair))
    }

    async fn issue(&self, grant: TokenGrant) -> Result<TokenResponse, OAuthError> {
        let minted = self.mint();
        let pair = self
            .store
            .create_token_pair(grant, minted.pending.clone())
            .await?;

        Ok(self.respond(minted, pair))
    }

    fn mint(&self) -> MintedPair {
        let now = Utc::now();
        let access_token = generate_token();
        let refresh_token = generate_token();

        let pending = PendingTokenPair {
            access_id: generate_id(ACCESS_TOKEN_ID_PREFIX),
            access_token_hash: hash_secret(&access_token),
            access_expires_at: now + self.lifetimes.access,
            refresh_id: generate_id(REFRESH_TOKEN_ID_PREFIX),
            refresh_token_hash: hash_secret(&refresh_token),
            refresh_expires_at: now + self.lifetimes.refresh,
        };

        MintedPair {
            access_token,
            refresh_token,
            pending,
        }
    }

    fn respond(&self, minted: MintedPair, pair: TokenPair) -> TokenResponse {
        TokenResponse {
            access_token: minted.access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.lifetimes.access.num_seconds(),
            refresh_token: minted.refresh_token,
            scope: pair.access.scope,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn invalid_refresh_token() -> OAuthError {
    OAuthError::InvalidGrant("Refresh token is invalid, expired or revoked".to_string())
}

fn tenancy_to_oauth(err: TenancyError) -> OAuthError {
    match err {
        TenancyError::AccessDenied(_) => {
            OAuthError::InvalidGrant("Access to the requested tenant is denied".to_string())
        }
        TenancyError::Store(e) => e.into(),
        other => OAuthError::ServerError(other.to_string()),
    }
}
