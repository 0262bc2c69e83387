/// OAuth2 client registration
///
/// # Endpoints
///
/// - `POST /oauth/clients` - Register a client (signed token)
/// - `GET /oauth/clients/:id` - Read a client's own registration (client auth)
///
/// The caller of the registration endpoint owns the client, and the tenant
/// in their token (if any) becomes the client's tenant. The plaintext secret
/// appears only in the registration response; only its digest is stored.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tenantgate_shared::{
    auth::{
        middleware::RequestContext,
        secret::{generate_client_secret, generate_id, hash_secret, CLIENT_ID_PREFIX},
    },
    models::client::{Client, CreateClient},
    oauth::{AuthenticatedClient, GrantType},
};
use tracing::info;
use validator::{Validate, ValidateUrl};

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiPath, ApiResult, ValidationErrorDetail},
};

/// Client registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterClientRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub redirect_uris: Vec<String>,

    pub grant_types: Vec<String>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

impl RegisterClientRequest {
    /// Checks the list fields the derive cannot express
    fn list_errors(&self) -> Vec<ValidationErrorDetail> {
        let mut errors = Vec::new();

        if let Some(uri) = self.redirect_uris.iter().find(|uri| !uri.validate_url()) {
            errors.push(ValidationErrorDetail::new(
                "redirect_uris",
                format!("'{}' is not a valid URL", uri),
            ));
        }

        if self.grant_types.is_empty() {
            errors.push(ValidationErrorDetail::new(
                "grant_types",
                "At least one grant type is required",
            ));
        } else if let Some(grant) = self
            .grant_types
            .iter()
            .find(|g| g.parse::<GrantType>().is_err())
        {
            errors.push(ValidationErrorDetail::new(
                "grant_types",
                format!("Grant type '{}' is not supported", grant),
            ));
        }

        if self
            .scopes
            .iter()
            .any(|s| s.is_empty() || s.chars().any(char::is_whitespace))
        {
            errors.push(ValidationErrorDetail::new(
                "scopes",
                "Scopes must be non-empty and contain no whitespace",
            ));
        }

        errors
    }
}

/// Registration response
#[derive(Debug, Serialize)]
pub struct ClientRegistration {
    pub client_id: String,

    /// Shown once
    pub client_secret: String,

    pub client: Client,
}

/// Drops repeats, keeping first occurrences in order
fn dedup(values: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

/// Register a client
///
/// # Endpoint
///
/// ```text
/// POST /oauth/clients
/// Authorization: Bearer eyJ...
/// Content-Type: application/json
///
/// {
///   "name": "reporting",
///   "redirect_uris": ["https://app.example.com/callback"],
///   "grant_types": ["client_credentials", "refresh_token"],
///   "scopes": ["read", "write"]
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "client_id": "cli_...",
///   "client_secret": "...",
///   "client": { "id": "cli_...", "name": "reporting", ... }
/// }
/// ```
pub async fn register_client(
    State(state): State<AppState>,
    context: RequestContext,
    ApiJson(req): ApiJson<RegisterClientRequest>,
) -> ApiResult<(StatusCode, Json<ClientRegistration>)> {
    req.validate()?;

    let errors = req.list_errors();
    if !errors.is_empty() {
        return Err(ApiError::ValidationError(errors));
    }

    let client_secret = generate_client_secret();
    let client = state
        .store
        .create_client(CreateClient {
            id: generate_id(CLIENT_ID_PREFIX),
            secret_hash: hash_secret(&client_secret),
            name: req.name.trim().to_string(),
            redirect_uris: req.redirect_uris,
            grant_types: dedup(req.grant_types),
            scopes: dedup(req.scopes),
            user_id: Some(context.user_id),
            tenant_id: context.tenant.as_ref().map(|t| t.tenant_id),
        })
        .await?;

    info!(
        client_id = %client.id,
        user_id = %context.user_id,
        tenant_id = ?client.tenant_id,
        "OAuth client registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(ClientRegistration {
            client_id: client.id.clone(),
            client_secret,
            client,
        }),
    ))
}

/// Read the authenticated client's registration
///
/// Asking for any other client id gives 404.
pub async fn get_client(
    AuthenticatedClient(client): AuthenticatedClient,
    ApiPath(client_id): ApiPath<String>,
) -> ApiResult<Json<Client>> {
    if client.id != client_id {
        return Err(ApiError::NotFound("Client not found".to_string()));
    }

    Ok(Json(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(grant_types: &[&str]) -> RegisterClientRequest {
        RegisterClientRequest {
            name: "app".to_string(),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            grant_types: grant_types.iter().map(|g| g.to_string()).collect(),
            scopes: vec!["read".to_string()],
        }
    }

    #[test]
    fn test_valid_request_has_no_list_errors() {
        assert!(request(&["client_credentials", "password"]).list_errors().is_empty());
    }

    #[test]
    fn test_unsupported_grant_type() {
        let errors = request(&["implicit"]).list_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "grant_types");
        assert!(errors[0].message.contains("implicit"));

        let errors = request(&[]).list_errors();
        assert_eq!(errors[0].field, "grant_types");
    }

    #[test]
    fn test_bad_redirect_uri_and_scope() {
        let mut req = request(&["password"]);
        req.redirect_uris.push("not a url".to_string());
        req.scopes.push("read write".to_string());

        let fields: Vec<String> = req.list_errors().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["redirect_uris", "scopes"]);
    }

    #[test]
    fn test_dedup_keeps_order() {
        let values = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup(values), vec!["b", "a", "c"]);
    }
}
