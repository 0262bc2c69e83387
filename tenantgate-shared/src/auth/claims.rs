/// Claims carried inside signed access tokens
///
/// Every service that verifies a token relies on these field names:
///
/// ```json
/// {
///   "email": "user@example.com",
///   "user_id": "6f1c2a9e-...",
///   "tenant_id": "0b9e44d1-...",
///   "tenant_name": "Acme",
///   "role": "owner",
///   "iat": 1735689600,
///   "exp": 1735776000
/// }
/// ```
///
/// `tenant_id`, `tenant_name` and `role` are either all present or all
/// absent. The fields are private so the only way to build claims is through
/// [`Claims::new`], which takes the tenant part as a single [`TenantContext`].

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant a token is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant ID
    pub tenant_id: Uuid,

    /// Tenant name (denormalized for display)
    pub tenant_name: String,

    /// Caller's role within the tenant
    pub role: String,
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    email: String,

    user_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,

    /// Issued at (Unix timestamp)
    iat: i64,

    /// Expiration time (Unix timestamp)
    exp: i64,
}

impl Claims {
    /// Creates claims that expire `ttl` from now
    ///
    /// A zero or negative `ttl` produces claims that are already expired,
    /// which is how tests exercise the expiry path.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Duration;
    /// use tenantgate_shared::auth::claims::{Claims, TenantContext};
    /// use uuid::Uuid;
    ///
    /// let tenant = TenantContext {
    ///     tenant_id: Uuid::new_v4(),
    ///     tenant_name: "Acme".to_string(),
    ///     role: "owner".to_string(),
    /// };
    ///
    /// let claims = Claims::new(Uuid::new_v4(), "user@example.com", Some(tenant), Duration::hours(1));
    /// assert!(claims.tenant().is_some());
    /// ```
    pub fn new(
        user_id: Uuid,
        email: impl Into<String>,
        tenant: Option<TenantContext>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let (tenant_id, tenant_name, role) = match tenant {
            Some(t) => (Some(t.tenant_id), Some(t.tenant_name), Some(t.role)),
            None => (None, None, None),
        };

        Self {
            email: email.into(),
            user_id,
            tenant_id,
            tenant_name,
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }

    /// Returns the tenant context, if the token carries one
    pub fn tenant(&self) -> Option<TenantContext> {
        match (&self.tenant_id, &self.tenant_name, &self.role) {
            (Some(tenant_id), Some(tenant_name), Some(role)) => Some(TenantContext {
                tenant_id: *tenant_id,
                tenant_name: tenant_name.clone(),
                role: role.clone(),
            }),
            _ => None,
        }
    }

    pub fn issued_at(&self) -> i64 {
        self.iat
    }

    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    /// Whether the tenant fields are all present or all absent
    pub fn has_consistent_tenant(&self) -> bool {
        let present = [
            self.tenant_id.is_some(),
            self.tenant_name.is_some(),
            self.role.is_some(),
        ];
        present.iter().all(|p| *p) || present.iter().all(|p| !*p)
    }

    /// Expired once `now >= exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}
