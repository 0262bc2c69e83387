/// Postgres-backed store
///
/// Multi-row operations open a transaction and lock the affected user's
/// membership rows with `FOR UPDATE`, so concurrent default changes for the
/// same user run one after another. The partial unique index on
/// `memberships(user_id) WHERE is_default` backs this up at the storage
/// layer.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{CredentialStore, IdentityStore, Store, StoreError, StoreResult, TenantStore};
use crate::db::pool::health_check;
use crate::models::client::{Client, CreateClient};
use crate::models::membership::{role, Membership, TenantMembership, UpsertMembership};
use crate::models::tenant::{CreateTenant, Tenant};
use crate::models::token::{AccessToken, PendingTokenPair, RefreshToken, TokenGrant, TokenPair};
use crate::models::user::{CreateUser, User};

/// Store over a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        Ok(User::create(&self.pool, &data).await?)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn create_tenant_with_owner(
        &self,
        data: CreateTenant,
    ) -> StoreResult<(Tenant, TenantMembership)> {
        let mut tx = self.pool.begin().await?;

        let tenant = Tenant::create(&mut *tx, &data).await?;

        Membership::lock_by_user(&mut *tx, data.owner_id).await?;
        Membership::clear_default(&mut *tx, data.owner_id).await?;
        Membership::upsert(
            &mut *tx,
            &UpsertMembership {
                user_id: data.owner_id,
                tenant_id: tenant.id,
                role: role::OWNER.to_string(),
                is_default: true,
            },
        )
        .await?;

        let membership = Membership::find_with_tenant(&mut *tx, data.owner_id, tenant.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("membership in tenant {}", tenant.id)))?;

        tx.commit().await?;

        debug!(tenant_id = %tenant.id, owner_id = %data.owner_id, "Tenant created with owner membership");
        Ok((tenant, membership))
    }

    async fn find_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        Ok(Tenant::find_by_id(&self.pool, id).await?)
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>> {
        Ok(Membership::find_with_tenant(&self.pool, user_id, tenant_id).await?)
    }

    async fn find_default_membership(&self, user_id: Uuid) -> StoreResult<Option<TenantMembership>> {
        Ok(Membership::find_default_with_tenant(&self.pool, user_id).await?)
    }

    async fn list_memberships(&self, user_id: Uuid) -> StoreResult<Vec<TenantMembership>> {
        Ok(Membership::list_by_user_with_tenant(&self.pool, user_id).await?)
    }

    async fn set_default_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>> {
        let mut tx = self.pool.begin().await?;

        Membership::lock_by_user(&mut *tx, user_id).await?;

        let target = match Membership::find_with_tenant(&mut *tx, user_id, tenant_id).await? {
            Some(target) if target.is_usable() => target,
            _ => return Ok(None),
        };

        Membership::clear_default(&mut *tx, user_id).await?;
        Membership::set_default(&mut *tx, user_id, tenant_id).await?;

        tx.commit().await?;

        Ok(Some(TenantMembership {
            is_default: true,
            ..target
        }))
    }

    async fn upsert_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        role: &str,
    ) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;

        Membership::lock_by_user(&mut *tx, user_id).await?;
        let has_default = Membership::find_default_with_tenant(&mut *tx, user_id)
            .await?
            .is_some();

        let membership = Membership::upsert(
            &mut *tx,
            &UpsertMembership {
                user_id,
                tenant_id,
                role: role.to_string(),
                is_default: !has_default,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(membership)
    }

    async fn remove_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let mut tx = self.pool.begin().await?;

        Membership::lock_by_user(&mut *tx, user_id).await?;

        let Some(removed) = Membership::delete(&mut *tx, user_id, tenant_id).await? else {
            return Ok(None);
        };

        if removed.is_default {
            if let Some(next) = Membership::find_oldest_usable(&mut *tx, user_id).await? {
                Membership::set_default(&mut *tx, user_id, next.tenant_id).await?;
                debug!(user_id = %user_id, tenant_id = %next.tenant_id, "Default tenant reassigned");
            }
        }

        tx.commit().await?;
        Ok(Some(removed))
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_client(&self, data: CreateClient) -> StoreResult<Client> {
        Ok(Client::create(&self.pool, &data).await?)
    }

    async fn find_client(&self, id: &str) -> StoreResult<Option<Client>> {
        Ok(Client::find_by_id(&self.pool, id).await?)
    }

    async fn create_token_pair(
        &self,
        grant: TokenGrant,
        pending: PendingTokenPair,
    ) -> StoreResult<TokenPair> {
        let mut tx = self.pool.begin().await?;

        let access = AccessToken::create(&mut *tx, &grant, &pending).await?;
        let refresh = RefreshToken::create(&mut *tx, &grant, &pending).await?;

        tx.commit().await?;
        Ok(TokenPair { access, refresh })
    }

    async fn find_access_token(&self, token_hash: &str) -> StoreResult<Option<AccessToken>> {
        Ok(AccessToken::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(RefreshToken::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        pending: PendingTokenPair,
    ) -> StoreResult<Option<TokenPair>> {
        let mut tx = self.pool.begin().await?;

        let Some(consumed) = RefreshToken::consume(&mut *tx, token_hash, client_id).await? else {
            return Ok(None);
        };

        let grant = match AccessToken::find_by_id(&mut *tx, &consumed.access_token_id).await? {
            Some(original) => TokenGrant {
                client_id: original.client_id,
                user_id: original.user_id,
                tenant_id: original.tenant_id,
                scope: original.scope,
            },
            None => TokenGrant {
                client_id: consumed.client_id,
                user_id: consumed.user_id,
                tenant_id: consumed.tenant_id,
                scope: String::new(),
            },
        };

        if let (Some(user_id), Some(tenant_id)) = (grant.user_id, grant.tenant_id) {
            Membership::lock_by_user(&mut *tx, user_id).await?;
            let usable = Membership::find_with_tenant(&mut *tx, user_id, tenant_id)
                .await?
                .is_some_and(|membership| membership.is_usable());
            if !usable {
                debug!(user_id = %user_id, tenant_id = %tenant_id, "Refresh rejected, tenant no longer accessible");
                return Ok(None);
            }
        }

        let access = AccessToken::create(&mut *tx, &grant, &pending).await?;
        let refresh = RefreshToken::create(&mut *tx, &grant, &pending).await?;

        tx.commit().await?;
        Ok(Some(TokenPair { access, refresh }))
    }

    async fn revoke_access_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool> {
        Ok(AccessToken::revoke_for_client(&self.pool, token_hash, client_id).await?)
    }

    async fn revoke_refresh_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool> {
        Ok(RefreshToken::revoke_for_client(&self.pool, token_hash, client_id).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(health_check(&self.pool).await?)
    }
}
