/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`. Every error becomes a JSON body of the
/// form `{error, error_description, details?}`:
///
/// | Variant | Status | `error` |
/// |---|---|---|
/// | `BadRequest` | 400 | `invalid_request` |
/// | `ValidationError` | 400 | `validation_error` |
/// | `Unauthorized` | 401 | `unauthorized` |
/// | `Forbidden` | 403 | `access_denied` |
/// | `NotFound` | 404 | `not_found` |
/// | `Conflict` | 409 | `conflict` |
/// | `InternalError` | 500 | `server_error` |
///
/// Auth gate and OAuth errors keep their own codes and are passed through.
///
/// # Example
///
/// ```
/// use axum::Json;
/// use serde_json::{json, Value};
/// use tenantgate_api::error::{ApiError, ApiResult};
///
/// async fn handler(name: String) -> ApiResult<Json<Value>> {
///     if name.is_empty() {
///         return Err(ApiError::BadRequest("name is required".to_string()));
///     }
///     Ok(Json(json!({ "name": name })))
/// }
/// ```

use std::fmt;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tenantgate_shared::{
    auth::{jwt::TokenError, middleware::AuthError, password::PasswordError},
    models::{tenant::NAME_UNIQUE_CONSTRAINT, user::EMAIL_UNIQUE_CONSTRAINT},
    oauth::OAuthError,
    store::StoreError,
    tenancy::TenancyError,
};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (400)
    BadRequest(String),

    /// Field validation failed (400)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Bad credentials or token (401)
    Unauthorized(String),

    /// Valid identity without access (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Duplicate unique key (409)
    Conflict(String),

    /// Storage or signing failure (500); details are logged, not returned
    InternalError(String),

    /// Auth gate rejection, rendered by the gate
    Auth(AuthError),

    /// OAuth endpoint error, rendered with the OAuth code set
    OAuth(OAuthError),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    pub error_description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Auth(err) => write!(f, "Auth error: {}", err),
            ApiError::OAuth(err) => write!(f, "OAuth error: {}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, description, details) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::OAuth(err) => return err.into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "access_denied", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            error_description: description,
            details,
        });

        (status, body).into_response()
    }
}

/// JSON body extractor whose rejections use the API error shape
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Path extractor whose rejections use the API error shape
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    ValidationErrorDetail::new(
                        field.to_string(),
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "Validation failed".to_string()),
                    )
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) if constraint == EMAIL_UNIQUE_CONSTRAINT => {
                ApiError::Conflict("Email is already registered".to_string())
            }
            StoreError::Conflict(constraint) if constraint == NAME_UNIQUE_CONSTRAINT => {
                ApiError::Conflict("Tenant name is already taken".to_string())
            }
            StoreError::Conflict(constraint) => {
                tracing::warn!(constraint = %constraint, "Unmapped unique constraint conflict");
                ApiError::Conflict("Resource already exists".to_string())
            }
            StoreError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StoreError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::AccessDenied(_) => {
                ApiError::Forbidden("Access to the requested tenant is denied".to_string())
            }
            TenancyError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            TenancyError::OwnerProtected => ApiError::Forbidden(err.to_string()),
            TenancyError::InsufficientRole { .. } => ApiError::Forbidden(err.to_string()),
            TenancyError::InvalidInput(msg) => ApiError::BadRequest(msg),
            TenancyError::Store(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(msg) => ApiError::InternalError(format!("Token signing failed: {}", msg)),
            TokenError::Expired => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Token is invalid".to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        ApiError::OAuth(err)
    }
}
