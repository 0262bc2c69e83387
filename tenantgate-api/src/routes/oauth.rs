/// OAuth2 endpoints
///
/// `token`, `introspect` and `revoke` take `application/x-www-form-urlencoded`
/// bodies and require HTTP Basic client authentication. Every error they
/// return uses the OAuth2 error codes (`invalid_request`, `invalid_client`,
/// `invalid_grant`, ...), including form parse failures.
///
/// `userinfo` is guarded by an opaque access token instead.

use axum::{extract::State, http::StatusCode, Json};
use tenantgate_shared::{
    auth::middleware::OAuthContext,
    oauth::{
        self, AuthenticatedClient, Introspection, OAuthError, TokenLookupRequest, TokenRequest,
        TokenResponse,
    },
};

use crate::app::AppState;

/// Form extractor whose rejections are `invalid_request`
#[derive(Debug, axum::extract::FromRequest)]
#[from_request(via(axum::Form), rejection(OAuthError))]
pub struct OAuthForm<T>(pub T);

/// Token endpoint
///
/// ```text
/// POST /oauth/token
/// Authorization: Basic base64(client_id:client_secret)
/// Content-Type: application/x-www-form-urlencoded
///
/// grant_type=password&username=user@example.com&password=...&scope=read
/// ```
pub async fn token(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    OAuthForm(req): OAuthForm<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let response = state.grants.handle(&client, req).await?;
    Ok(Json(response))
}

/// Introspection endpoint
///
/// Always 200; unknown, revoked and expired tokens are `{"active": false}`.
pub async fn introspect(
    State(state): State<AppState>,
    AuthenticatedClient(_client): AuthenticatedClient,
    OAuthForm(req): OAuthForm<TokenLookupRequest>,
) -> Result<Json<Introspection>, OAuthError> {
    let introspection = oauth::introspect(&*state.store, req.token()?).await?;
    Ok(Json(introspection))
}

/// Revocation endpoint
///
/// Always 200 for a well-formed request, whether or not a token matched.
pub async fn revoke(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    OAuthForm(req): OAuthForm<TokenLookupRequest>,
) -> Result<StatusCode, OAuthError> {
    oauth::revoke(&*state.store, &client, req.token()?, req.hint()).await?;
    Ok(StatusCode::OK)
}

pub async fn userinfo(context: OAuthContext) -> Json<OAuthContext> {
    Json(context)
}
