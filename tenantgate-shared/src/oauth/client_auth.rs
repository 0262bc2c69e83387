/// OAuth2 client authentication
///
/// Clients authenticate with `Authorization: Basic base64(client_id:client_secret)`.
/// The presented secret is hashed and compared in constant time with the
/// stored digest. Unknown clients, inactive clients and wrong secrets all
/// produce the same `invalid_client` error.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use super::error::OAuthError;
use crate::auth::secret::verify_secret;
use crate::models::client::Client;
use crate::store::CredentialStore;

/// SHA-256 of the empty string, compared against when the client is unknown
const UNKNOWN_CLIENT_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Client id and secret presented in a Basic header
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// The client that authenticated the current request
#[derive(Debug, Clone)]
pub struct AuthenticatedClient(pub Client);

fn authentication_failed() -> OAuthError {
    OAuthError::InvalidClient("Client authentication failed".to_string())
}

/// Parses `Authorization: Basic ...`
pub fn parse_basic(headers: &HeaderMap) -> Result<ClientCredentials, OAuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OAuthError::InvalidClient("Client authentication required".to_string()))?;

    let encoded = match value.trim().split_once(' ') {
        Some((scheme, encoded)) if scheme.eq_ignore_ascii_case("basic") => encoded.trim(),
        _ => return Err(OAuthError::InvalidClient("Client authentication required".to_string())),
    };

    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(authentication_failed)?;

    match decoded.split_once(':') {
        Some((client_id, client_secret)) if !client_id.is_empty() && !client_secret.is_empty() => {
            Ok(ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            })
        }
        _ => Err(authentication_failed()),
    }
}

/// Verifies client credentials against the store
pub async fn authenticate_client<S>(
    store: &S,
    credentials: &ClientCredentials,
) -> Result<Client, OAuthError>
where
    S: CredentialStore + ?Sized,
{
    let client = store.find_client(&credentials.client_id).await?;

    let stored_digest = client
        .as_ref()
        .map(|c| c.secret_hash.as_str())
        .unwrap_or(UNKNOWN_CLIENT_DIGEST);
    let secret_matches = verify_secret(&credentials.client_secret, stored_digest);

    match client {
        Some(client) if secret_matches && client.active => {
            debug!(client_id = %client.id, "Client authenticated");
            Ok(client)
        }
        _ => {
            warn!(client_id = %credentials.client_id, "Client authentication failed");
            Err(authentication_failed())
        }
    }
}

/// Client authentication gate for the OAuth endpoints
///
/// Inserts an [`AuthenticatedClient`] into the request extensions.
pub async fn client_auth<S>(
    State(store): State<Arc<S>>,
    mut req: Request,
    next: Next,
) -> Result<Response, OAuthError>
where
    S: CredentialStore + ?Sized + 'static,
{
    let credentials = parse_basic(req.headers())?;
    let client = authenticate_client(&*store, &credentials).await?;

    req.extensions_mut().insert(AuthenticatedClient(client));
    Ok(next.run(req).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedClient {
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedClient>()
            .cloned()
            .ok_or_else(|| OAuthError::InvalidClient("Client authentication required".to_string()))
    }
}
