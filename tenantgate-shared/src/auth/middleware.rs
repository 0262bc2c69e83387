/// Auth gate for Axum
///
/// Two gates put a typed context into the request extensions:
///
/// - [`jwt_auth`] verifies a signed `Authorization: Bearer` token with the
///   [`TokenCodec`] and attaches a [`RequestContext`].
/// - [`opaque_token_auth`] looks an opaque OAuth2 access token up in the
///   credential store, since those are individually revocable, and attaches
///   an [`OAuthContext`].
///
/// [`require_tenant`] layered after [`jwt_auth`] rejects tokens without a
/// tenant with `403 tenant_required`. Handlers read the context through the
/// [`RequestContext`], [`TenantScope`] and [`OAuthContext`] extractors.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use axum::{middleware, routing::get, Router};
/// use chrono::Duration;
/// use tenantgate_shared::auth::jwt::TokenCodec;
/// use tenantgate_shared::auth::middleware::{jwt_auth, require_tenant, TenantScope};
///
/// async fn handler(scope: TenantScope) -> String {
///     format!("{} in {}", scope.user_id, scope.tenant.tenant_name)
/// }
///
/// let codec = Arc::new(TokenCodec::new("a-signing-key-of-at-least-32-bytes!!", Duration::hours(24)));
///
/// let app: Router = Router::new()
///     .route("/tenant", get(handler))
///     .route_layer(middleware::from_fn(require_tenant))
///     .route_layer(middleware::from_fn_with_state(codec, jwt_auth));
/// ```

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::claims::{Claims, TenantContext};
use super::jwt::{TokenCodec, TokenError};
use super::scope::missing_scopes;
use super::secret::hash_secret;
use crate::store::CredentialStore;

/// Identity and tenant of a verified signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub email: String,
    /// Present only if the token carries a tenant
    pub tenant: Option<TenantContext>,
    /// Unix seconds
    pub expires_at: i64,
}

impl RequestContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id(),
            email: claims.email().to_string(),
            tenant: claims.tenant(),
            expires_at: claims.expires_at(),
        }
    }
}

/// A [`RequestContext`] whose token carries a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantScope {
    pub user_id: Uuid,
    pub email: String,
    pub tenant: TenantContext,
}

/// Context of a verified opaque OAuth2 access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthContext {
    pub token_id: String,
    pub client_id: String,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Auth gate rejections
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingCredentials,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,

    #[error("{0}")]
    InvalidToken(String),

    /// Route needs a tenant but the token carries none
    #[error("This operation requires a tenant context")]
    TenantRequired,

    #[error("Token lacks required scope: {}", .0.join(" "))]
    InsufficientScope(Vec<String>),

    #[error("Storage error: {0}")]
    Store(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidScheme | AuthError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::TenantRequired | AuthError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "unauthorized",
            AuthError::InvalidScheme => "invalid_request",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TenantRequired => "tenant_required",
            AuthError::InsufficientScope(_) => "insufficient_scope",
            AuthError::Store(_) => "server_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let description = match &self {
            AuthError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": self.code(),
            "error_description": description,
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = match self {
                AuthError::InvalidToken(_) => r#"Bearer error="invalid_token""#,
                _ => "Bearer",
            };
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}

/// Extracts the token from `Authorization: Bearer <token>`
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::InvalidScheme),
    }
}

/// Signed-token gate
///
/// Verifies the bearer token (signature, algorithm, expiry) and inserts a
/// [`RequestContext`]. Any failure is a 401.
pub async fn jwt_auth(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let claims = {
        let token = bearer_token(req.headers())?;
        codec.decode(token).map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            match e {
                TokenError::Expired => AuthError::InvalidToken("Token has expired".to_string()),
                _ => AuthError::InvalidToken("Token is invalid".to_string()),
            }
        })?
    };

    req.extensions_mut().insert(RequestContext::from_claims(&claims));
    Ok(next.run(req).await)
}

/// Rejects requests whose signed token carries no tenant
///
/// Must run after [`jwt_auth`].
pub async fn require_tenant(req: Request, next: Next) -> Result<Response, AuthError> {
    let context = req
        .extensions()
        .get::<RequestContext>()
        .ok_or(AuthError::MissingCredentials)?;

    if context.tenant.is_none() {
        debug!(user_id = %context.user_id, "Tenant-scoped route called without tenant");
        return Err(AuthError::TenantRequired);
    }

    Ok(next.run(req).await)
}

/// Opaque-token gate state
///
/// Optionally demands a set of scopes from every token it admits.
pub struct BearerGate<S: ?Sized> {
    store: Arc<S>,
    required_scopes: Arc<[String]>,
}

impl<S: ?Sized> Clone for BearerGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            required_scopes: Arc::clone(&self.required_scopes),
        }
    }
}

impl<S> BearerGate<S>
where
    S: CredentialStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            required_scopes: Arc::from(Vec::new()),
        }
    }

    pub fn require_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        self.required_scopes = Arc::from(scopes);
        self
    }

    /// Looks the token up and checks it is live and sufficiently scoped
    pub async fn authenticate(&self, token: &str) -> Result<OAuthContext, AuthError> {
        let record = self
            .store
            .find_access_token(&hash_secret(token))
            .await
            .map_err(|e| {
                error!(error = %e, "Access token lookup failed");
                AuthError::Store(e.to_string())
            })?;

        let record = match record {
            Some(record) if record.is_valid_at(Utc::now()) => record,
            _ => {
                return Err(AuthError::InvalidToken(
                    "Token is invalid, expired or revoked".to_string(),
                ))
            }
        };

        let scopes = record.scopes();
        let missing = missing_scopes(&scopes, &self.required_scopes);
        if !missing.is_empty() {
            warn!(client_id = %record.client_id, missing = ?missing, "Token lacks required scope");
            return Err(AuthError::InsufficientScope(
                missing.into_iter().map(String::from).collect(),
            ));
        }

        Ok(OAuthContext {
            token_id: record.id,
            client_id: record.client_id,
            user_id: record.user_id,
            tenant_id: record.tenant_id,
            scopes,
            expires_at: record.expires_at,
        })
    }
}

/// Opaque-token gate
///
/// Requires a live (unrevoked, unexpired) access token and inserts an
/// [`OAuthContext`].
pub async fn opaque_token_auth<S>(
    State(gate): State<BearerGate<S>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    S: CredentialStore + ?Sized + 'static,
{
    let token = bearer_token(req.headers())?.to_string();
    let context = gate.authenticate(&token).await?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantScope {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = RequestContext::from_request_parts(parts, state).await?;

        match context.tenant {
            Some(tenant) => Ok(TenantScope {
                user_id: context.user_id,
                email: context.email,
                tenant,
            }),
            None => Err(AuthError::TenantRequired),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OAuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OAuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}
