/// Tenant endpoints
///
/// All routes require a signed token. Membership checks are done by the
/// tenant resolver, so a tenant the caller does not belong to looks the same
/// as one that does not exist (403).
///
/// # Endpoints
///
/// - `POST /v1/tenants` - Create a tenant owned by the caller
/// - `GET /v1/tenants` - List the caller's memberships
/// - `GET /v1/tenants/:id` - Tenant details (members only)
/// - `POST /v1/tenants/switch` - Re-issue the token for another tenant
/// - `POST /v1/tenants/default` - Change the caller's default tenant
/// - `POST /v1/tenants/:id/members` - Add a member or change its role
/// - `DELETE /v1/tenants/:id/members/:user_id` - Remove a member
/// - `GET /v1/tenant/context` - Current tenant (token must carry one)

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tenantgate_shared::{
    auth::middleware::{RequestContext, TenantScope},
    models::{
        membership::{Membership, TenantMembership},
        tenant::Tenant,
    },
};
use uuid::Uuid;
use validator::Validate;

use super::auth::SessionToken;
use crate::{
    app::AppState,
    error::{ApiJson, ApiPath, ApiResult},
};

/// Create tenant request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    pub settings: Option<JsonValue>,
}

/// Body of the switch and default endpoints
#[derive(Debug, Deserialize)]
pub struct TenantSelection {
    pub tenant_id: Uuid,
}

/// Add member request
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Defaults to `member`
    #[validate(length(min = 1, max = 32, message = "Role must be between 1 and 32 characters"))]
    pub role: Option<String>,
}

/// A tenant together with the caller's membership in it
#[derive(Debug, Serialize)]
pub struct TenantDetail {
    #[serde(flatten)]
    pub tenant: Tenant,

    pub role: String,

    pub is_default: bool,
}

impl TenantDetail {
    fn new(tenant: Tenant, membership: TenantMembership) -> Self {
        Self {
            tenant,
            role: membership.role,
            is_default: membership.is_default,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantList {
    pub tenants: Vec<TenantMembership>,
}

/// Create a tenant
///
/// The caller becomes its owner and the new membership becomes the caller's
/// default tenant. The current token is not changed; switch to use it.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid name
/// - `409 Conflict`: Name already taken
pub async fn create_tenant(
    State(state): State<AppState>,
    context: RequestContext,
    ApiJson(req): ApiJson<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantDetail>)> {
    req.validate()?;

    let (tenant, membership) = state
        .tenants
        .create_tenant(context.user_id, &req.name, req.settings)
        .await?;

    Ok((StatusCode::CREATED, Json(TenantDetail::new(tenant, membership))))
}

/// List the caller's memberships with tenant names
pub async fn list_tenants(
    State(state): State<AppState>,
    context: RequestContext,
) -> ApiResult<Json<TenantList>> {
    let tenants = state.tenants.list_tenants(context.user_id).await?;
    Ok(Json(TenantList { tenants }))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    context: RequestContext,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> ApiResult<Json<TenantDetail>> {
    let (tenant, membership) = state.tenants.get_tenant(context.user_id, tenant_id).await?;
    Ok(Json(TenantDetail::new(tenant, membership)))
}

/// Switch tenant
///
/// Resolves the requested tenant for the caller and issues a new token
/// bound to it. The presented token stays valid until it expires.
///
/// # Errors
///
/// - `403 Forbidden`: No usable membership in the tenant
pub async fn switch_tenant(
    State(state): State<AppState>,
    context: RequestContext,
    ApiJson(req): ApiJson<TenantSelection>,
) -> ApiResult<Json<SessionToken>> {
    let tenant = state.tenants.switch(context.user_id, req.tenant_id).await?;

    let session = SessionToken::issue(&state.codec, context.user_id, &context.email, Some(tenant))?;
    Ok(Json(session))
}

pub async fn set_default_tenant(
    State(state): State<AppState>,
    context: RequestContext,
    ApiJson(req): ApiJson<TenantSelection>,
) -> ApiResult<Json<TenantMembership>> {
    let membership = state.tenants.set_default(context.user_id, req.tenant_id).await?;
    Ok(Json(membership))
}

/// Add a member
///
/// Owner or admin only. An existing membership gets its role updated.
///
/// # Errors
///
/// - `403 Forbidden`: Caller cannot manage members, or target is the owner
/// - `404 Not Found`: No identity with that email
pub async fn add_member(
    State(state): State<AppState>,
    context: RequestContext,
    ApiPath(tenant_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<Json<Membership>> {
    req.validate()?;

    let membership = state
        .tenants
        .add_member(context.user_id, tenant_id, &req.email, req.role.as_deref())
        .await?;

    Ok(Json(membership))
}

/// Remove a member
///
/// Owner or admin only. The owner cannot be removed.
pub async fn remove_member(
    State(state): State<AppState>,
    context: RequestContext,
    ApiPath((tenant_id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .tenants
        .remove_member(context.user_id, tenant_id, user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Current tenant of a tenant-bound token
pub async fn tenant_context(scope: TenantScope) -> Json<TenantScope> {
    Json(scope)
}
