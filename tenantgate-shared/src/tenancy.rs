//! Tenant context resolution and membership management
//!
//! [`TenantResolver`] decides which tenant, if any, an issued token carries.
//! A requested tenant must be backed by a usable membership (membership and
//! tenant both active); there is no fallback to another tenant. Without a
//! request the identity's default membership is used, and no default means
//! no tenant.
//!
//! The resolver also owns the membership operations whose invariants it
//! enforces: one owner membership per tenant that cannot be removed, and at
//! most one default membership per identity.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::claims::TenantContext;
use crate::models::membership::{can_manage_members, role, Membership, TenantMembership};
use crate::models::tenant::{CreateTenant, Tenant};
use crate::store::{IdentityStore, StoreError, TenantStore};

/// Maximum tenant name length
pub const MAX_TENANT_NAME_LENGTH: usize = 255;

/// Tenant errors
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// No usable membership in the tenant
    #[error("Access to tenant {0} is denied")]
    AccessDenied(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    /// The owner's membership cannot be changed through member management
    #[error("The tenant owner's membership cannot be modified")]
    OwnerProtected,

    #[error("Role '{role}' cannot manage members")]
    InsufficientRole { role: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of tenant resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Tenant(TenantContext),
    NoTenant,
}

impl Resolution {
    pub fn into_context(self) -> Option<TenantContext> {
        match self {
            Resolution::Tenant(context) => Some(context),
            Resolution::NoTenant => None,
        }
    }
}

/// Resolves tenant context and manages memberships
pub struct TenantResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for TenantResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TenantResolver<S>
where
    S: TenantStore + IdentityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolves the tenant an identity's token should carry
    ///
    /// # Errors
    ///
    /// [`TenancyError::AccessDenied`] if `requested` is given and the
    /// identity has no usable membership there.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        requested: Option<Uuid>,
    ) -> Result<Resolution, TenancyError> {
        match requested {
            Some(tenant_id) => match self.store.find_membership(user_id, tenant_id).await? {
                Some(membership) if membership.is_usable() => {
                    Ok(Resolution::Tenant(membership.context()))
                }
                _ => {
                    warn!(user_id = %user_id, tenant_id = %tenant_id, "Tenant access denied");
                    Err(TenancyError::AccessDenied(tenant_id))
                }
            },
            None => match self.store.find_default_membership(user_id).await? {
                Some(membership) if membership.is_usable() => {
                    Ok(Resolution::Tenant(membership.context()))
                }
                _ => Ok(Resolution::NoTenant),
            },
        }
    }

    /// Resolves an explicitly requested tenant for a context switch
    pub async fn switch(&self, user_id: Uuid, tenant_id: Uuid) -> Result<TenantContext, TenancyError> {
        let context = self
            .resolve(user_id, Some(tenant_id))
            .await?
            .into_context()
            .ok_or(TenancyError::AccessDenied(tenant_id))?;

        info!(user_id = %user_id, tenant_id = %tenant_id, "Tenant switched");
        Ok(context)
    }

    /// Creates a tenant owned by `owner_id`
    ///
    /// The owner membership becomes the owner's default tenant.
    pub async fn create_tenant(
        &self,
        owner_id: Uuid,
        name: &str,
        settings: Option<JsonValue>,
    ) -> Result<(Tenant, TenantMembership), TenancyError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TENANT_NAME_LENGTH {
            return Err(TenancyError::InvalidInput(format!(
                "Tenant name must be between 1 and {} characters",
                MAX_TENANT_NAME_LENGTH
            )));
        }

        let (tenant, membership) = self
            .store
            .create_tenant_with_owner(CreateTenant {
                name: name.to_string(),
                owner_id,
                settings,
            })
            .await?;

        info!(tenant_id = %tenant.id, owner_id = %owner_id, "Tenant created");
        Ok((tenant, membership))
    }

    pub async fn list_tenants(&self, user_id: Uuid) -> Result<Vec<TenantMembership>, TenancyError> {
        Ok(self.store.list_memberships(user_id).await?)
    }

    /// Returns a tenant the identity is a usable member of
    pub async fn get_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(Tenant, TenantMembership), TenancyError> {
        let membership = self.usable_membership(user_id, tenant_id).await?;
        let tenant = self
            .store
            .find_tenant(tenant_id)
            .await?
            .ok_or(TenancyError::AccessDenied(tenant_id))?;

        Ok((tenant, membership))
    }

    /// Makes `tenant_id` the identity's default tenant
    pub async fn set_default(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<TenantMembership, TenancyError> {
        let membership = self
            .store
            .set_default_membership(user_id, tenant_id)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %user_id, tenant_id = %tenant_id, "Default tenant change denied");
                TenancyError::AccessDenied(tenant_id)
            })?;

        info!(user_id = %user_id, tenant_id = %tenant_id, "Default tenant changed");
        Ok(membership)
    }

    /// Adds an identity to a tenant, or changes its role
    ///
    /// `actor_id` must be an owner or admin of the tenant. The owner role
    /// cannot be granted and the owner's membership cannot be changed.
    pub async fn add_member(
        &self,
        actor_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        member_role: Option<&str>,
    ) -> Result<Membership, TenancyError> {
        let member_role = member_role.map(str::trim).unwrap_or(role::MEMBER);
        if member_role.is_empty() || member_role.len() > 32 {
            return Err(TenancyError::InvalidInput(
                "Role must be between 1 and 32 characters".to_string(),
            ));
        }
        if member_role == role::OWNER {
            return Err(TenancyError::InvalidInput(
                "The owner role cannot be granted".to_string(),
            ));
        }

        self.require_manager(actor_id, tenant_id).await?;

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| TenancyError::NotFound("User".to_string()))?;

        let tenant = self
            .store
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound("Tenant".to_string()))?;
        if tenant.owner_id == user.id {
            return Err(TenancyError::OwnerProtected);
        }

        let membership = self
            .store
            .upsert_membership(user.id, tenant_id, member_role)
            .await?;

        info!(
            tenant_id = %tenant_id,
            user_id = %user.id,
            role = %membership.role,
            "Member added"
        );
        Ok(membership)
    }

    /// Removes an identity from a tenant
    ///
    /// If the removed membership was the identity's default, its oldest
    /// remaining usable membership becomes the default.
    pub async fn remove_member(
        &self,
        actor_id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, TenancyError> {
        self.require_manager(actor_id, tenant_id).await?;

        let tenant = self
            .store
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound("Tenant".to_string()))?;
        if tenant.owner_id == user_id {
            warn!(tenant_id = %tenant_id, "Attempt to remove tenant owner");
            return Err(TenancyError::OwnerProtected);
        }

        let removed = self
            .store
            .remove_membership(user_id, tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound("Membership".to_string()))?;

        info!(tenant_id = %tenant_id, user_id = %user_id, "Member removed");
        Ok(removed)
    }

    async fn usable_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<TenantMembership, TenancyError> {
        match self.store.find_membership(user_id, tenant_id).await? {
            Some(membership) if membership.is_usable() => Ok(membership),
            _ => Err(TenancyError::AccessDenied(tenant_id)),
        }
    }

    async fn require_manager(&self, actor_id: Uuid, tenant_id: Uuid) -> Result<(), TenancyError> {
        let membership = self.usable_membership(actor_id, tenant_id).await?;

        if !can_manage_members(&membership.role) {
            return Err(TenancyError::InsufficientRole {
                role: membership.role,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{CreateUser, User};
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        resolver: TenantResolver<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                resolver: TenantResolver::new(Arc::clone(&store)),
                store,
            }
        }

        async fn user(&self, email: &str) -> User {
            self.store
                .create_user(CreateUser {
                    email: email.to_string(),
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_create_tenant_makes_owner_default() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;

        let (t1, membership) = fx.resolver.create_tenant(u1.id, "t1", None).await.unwrap();

        assert_eq!(membership.role, "owner");
        assert!(membership.is_default);

        let resolved = fx.resolver.resolve(u1.id, Some(t1.id)).await.unwrap();
        assert_eq!(
            resolved,
            Resolution::Tenant(TenantContext {
                tenant_id: t1.id,
                tenant_name: "t1".to_string(),
                role: "owner".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_denies_non_member() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;
        let u2 = fx.user("u2@example.com").await;
        fx.resolver.create_tenant(u1.id, "t1", None).await.unwrap();
        let (t2, _) = fx.resolver.create_tenant(u2.id, "t2", None).await.unwrap();

        let err = fx.resolver.resolve(u1.id, Some(t2.id)).await.unwrap_err();
        assert!(matches!(err, TenancyError::AccessDenied(id) if id == t2.id));

        let err = fx.resolver.switch(u1.id, t2.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_resolve_without_request_uses_default() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;

        assert_eq!(fx.resolver.resolve(u1.id, None).await.unwrap(), Resolution::NoTenant);

        let (t1, _) = fx.resolver.create_tenant(u1.id, "t1", None).await.unwrap();
        let context = fx.resolver.resolve(u1.id, None).await.unwrap().into_context().unwrap();
        assert_eq!(context.tenant_id, t1.id);
    }

    #[tokio::test]
    async fn test_resolve_requires_active_tenant_and_membership() {
        let fx = Fixture::new();
        let owner = fx.user("owner@example.com").await;
        let member = fx.user("member@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(owner.id, "t1", None).await.unwrap();
        fx.resolver
            .add_member(owner.id, t1.id, "member@example.com", None)
            .await
            .unwrap();

        fx.store.set_membership_active(member.id, t1.id, false).await.unwrap();
        assert!(fx.resolver.resolve(member.id, Some(t1.id)).await.is_err());
        assert_eq!(fx.resolver.resolve(member.id, None).await.unwrap(), Resolution::NoTenant);

        fx.store.set_membership_active(member.id, t1.id, true).await.unwrap();
        fx.store.set_tenant_active(t1.id, false).await.unwrap();
        assert!(fx.resolver.resolve(owner.id, Some(t1.id)).await.is_err());
    }

    #[tokio::test]
    async fn test_create_tenant_validates_name() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;

        let err = fx.resolver.create_tenant(u1.id, "   ", None).await.unwrap_err();
        assert!(matches!(err, TenancyError::InvalidInput(_)));

        fx.resolver.create_tenant(u1.id, "acme", None).await.unwrap();
        let err = fx.resolver.create_tenant(u1.id, "acme", None).await.unwrap_err();
        assert!(matches!(err, TenancyError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_set_default_requires_membership() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;
        let u2 = fx.user("u2@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(u1.id, "t1", None).await.unwrap();
        let (t2, _) = fx.resolver.create_tenant(u1.id, "t2", None).await.unwrap();
        let (t3, _) = fx.resolver.create_tenant(u2.id, "t3", None).await.unwrap();

        let membership = fx.resolver.set_default(u1.id, t1.id).await.unwrap();
        assert!(membership.is_default);

        let err = fx.resolver.set_default(u1.id, t3.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::AccessDenied(_)));

        let defaults: Vec<_> = fx
            .resolver
            .list_tenants(u1.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_default)
            .map(|m| m.tenant_id)
            .collect();
        assert_eq!(defaults, vec![t1.id]);
        assert_ne!(defaults[0], t2.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_default_keeps_single_default() {
        let fx = Fixture::new();
        let u1 = fx.user("u1@example.com").await;

        let mut tenant_ids = Vec::new();
        for i in 0..5 {
            let (tenant, _) = fx
                .resolver
                .create_tenant(u1.id, &format!("tenant-{}", i), None)
                .await
                .unwrap();
            tenant_ids.push(tenant.id);
        }

        let mut handles = Vec::new();
        for round in 0..20 {
            let resolver = fx.resolver.clone();
            let tenant_id = tenant_ids[round % tenant_ids.len()];
            handles.push(tokio::spawn(async move {
                resolver.set_default(u1.id, tenant_id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let memberships = fx.resolver.list_tenants(u1.id).await.unwrap();
        assert_eq!(memberships.iter().filter(|m| m.is_default).count(), 1);
    }

    #[tokio::test]
    async fn test_add_member_requires_manager_role() {
        let fx = Fixture::new();
        let owner = fx.user("owner@example.com").await;
        let member = fx.user("member@example.com").await;
        fx.user("third@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(owner.id, "t1", None).await.unwrap();

        let added = fx
            .resolver
            .add_member(owner.id, t1.id, "member@example.com", None)
            .await
            .unwrap();
        assert_eq!(added.role, "member");
        assert!(added.is_default);

        let err = fx
            .resolver
            .add_member(member.id, t1.id, "third@example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::InsufficientRole { ref role } if role == "member"));

        let promoted = fx
            .resolver
            .add_member(owner.id, t1.id, "member@example.com", Some("admin"))
            .await
            .unwrap();
        assert_eq!(promoted.role, "admin");

        fx.resolver
            .add_member(member.id, t1.id, "third@example.com", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_member_rejections() {
        let fx = Fixture::new();
        let owner = fx.user("owner@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(owner.id, "t1", None).await.unwrap();

        let err = fx
            .resolver
            .add_member(owner.id, t1.id, "ghost@example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::NotFound(_)));

        let err = fx
            .resolver
            .add_member(owner.id, t1.id, "owner@example.com", Some("member"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::OwnerProtected));

        let err = fx
            .resolver
            .add_member(owner.id, t1.id, "owner@example.com", Some("owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_owner_cannot_be_removed() {
        let fx = Fixture::new();
        let owner = fx.user("owner@example.com").await;
        let admin = fx.user("admin@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(owner.id, "t1", None).await.unwrap();
        fx.resolver
            .add_member(owner.id, t1.id, "admin@example.com", Some("admin"))
            .await
            .unwrap();

        let err = fx.resolver.remove_member(admin.id, t1.id, owner.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::OwnerProtected));

        let err = fx.resolver.remove_member(owner.id, t1.id, owner.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::OwnerProtected));

        assert!(fx.resolver.resolve(owner.id, Some(t1.id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_member_reassigns_default_to_oldest() {
        let fx = Fixture::new();
        let owner = fx.user("owner@example.com").await;
        let member = fx.user("member@example.com").await;
        let (t1, _) = fx.resolver.create_tenant(owner.id, "t1", None).await.unwrap();
        let (t2, _) = fx.resolver.create_tenant(owner.id, "t2", None).await.unwrap();
        let (t3, _) = fx.resolver.create_tenant(owner.id, "t3", None).await.unwrap();

        for tenant_id in [t1.id, t2.id, t3.id] {
            fx.resolver
                .add_member(owner.id, tenant_id, "member@example.com", None)
                .await
                .unwrap();
        }

        let removed = fx.resolver.remove_member(owner.id, t1.id, member.id).await.unwrap();
        assert!(removed.is_default);

        let context = fx.resolver.resolve(member.id, None).await.unwrap().into_context().unwrap();
        assert_eq!(context.tenant_id, t2.id);

        let err = fx.resolver.remove_member(owner.id, t1.id, member.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::NotFound(_)));
    }
}
