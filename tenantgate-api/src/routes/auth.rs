/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register a new identity
/// - `POST /v1/auth/login` - Verify credentials and issue a signed token
/// - `GET /v1/auth/me` - Describe the caller's token

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tenantgate_shared::{
    auth::{
        claims::TenantContext,
        jwt::TokenCodec,
        middleware::RequestContext,
        password,
    },
    models::user::{CreateUser, User},
};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult, ValidationErrorDetail},
};

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked against the password policy after field validation
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Tenant to bind into the token; the default tenant otherwise
    pub tenant_id: Option<Uuid>,
}

/// A freshly issued signed token
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,

    pub token_type: String,

    /// Unix seconds
    pub expires_at: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantContext>,
}

impl SessionToken {
    pub(crate) fn issue(
        codec: &TokenCodec,
        user_id: Uuid,
        email: &str,
        tenant: Option<TenantContext>,
    ) -> ApiResult<Self> {
        let (token, claims) = codec.issue(user_id, email, tenant)?;

        Ok(Self {
            token,
            token_type: "Bearer".to_string(),
            expires_at: claims.expires_at(),
            tenant: claims.tenant(),
        })
    }
}

/// Register and login response
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub session: SessionToken,

    pub user: User,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

/// Register a new identity
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "user@example.com",
///   "password": "SecureP@ss123"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "token": "eyJ...",
///   "token_type": "Bearer",
///   "expires_at": 1735689600,
///   "user": { "id": "uuid", "email": "user@example.com", ... }
/// }
/// ```
///
/// The token carries no tenant; create or join one, then switch.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;

    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::ValidationError(vec![ValidationErrorDetail::new("password", e)]))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .store
        .create_user(CreateUser {
            email: req.email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, "User registered");

    let session = SessionToken::issue(&state.codec, user.id, &user.email, None)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { session, user })))
}

/// Log in
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// {
///   "email": "user@example.com",
///   "password": "SecureP@ss123",
///   "tenant_id": "uuid"          // optional
/// }
/// ```
///
/// Without `tenant_id` the token carries the caller's default tenant, if
/// any.
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password (indistinguishable)
/// - `403 Forbidden`: No usable membership in the requested tenant
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = state.store.find_user_by_email(&req.email).await?;
    let verified = password::verify_credentials(
        &req.password,
        user.as_ref().map(|u| u.password_hash.as_str()),
    )?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!("Login failed");
            return Err(invalid_credentials());
        }
    };

    let tenant = state
        .tenants
        .resolve(user.id, req.tenant_id)
        .await?
        .into_context();

    info!(
        user_id = %user.id,
        tenant_id = ?tenant.as_ref().map(|t| t.tenant_id),
        "User logged in"
    );

    let session = SessionToken::issue(&state.codec, user.id, &user.email, tenant)?;
    Ok(Json(AuthResponse { session, user }))
}

/// Describe the caller's verified token
///
/// ```text
/// GET /v1/auth/me
/// Authorization: Bearer eyJ...
/// ```
pub async fn me(context: RequestContext) -> Json<RequestContext> {
    Json(context)
}
