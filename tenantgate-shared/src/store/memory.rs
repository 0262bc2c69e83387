/// In-memory store
///
/// Holds every table behind one `tokio::sync::Mutex`, so each trait method is
/// trivially atomic. Uniqueness is checked against the same constraint names
/// the Postgres schema uses, which keeps error mapping identical between the
/// two stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialStore, IdentityStore, Store, StoreError, StoreResult, TenantStore};
use crate::models::client::{Client, CreateClient};
use crate::models::membership::{role, Membership, TenantMembership};
use crate::models::tenant::{CreateTenant, Tenant, NAME_UNIQUE_CONSTRAINT};
use crate::models::token::{AccessToken, PendingTokenPair, RefreshToken, TokenGrant, TokenPair};
use crate::models::user::{normalize_email, CreateUser, User, EMAIL_UNIQUE_CONSTRAINT};

const CLIENT_ID_CONSTRAINT: &str = "oauth_clients_pkey";
const ACCESS_HASH_CONSTRAINT: &str = "oauth_access_tokens_token_hash_key";
const REFRESH_HASH_CONSTRAINT: &str = "oauth_refresh_tokens_token_hash_key";

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tenants: HashMap<Uuid, Tenant>,
    /// Insertion order doubles as creation order
    memberships: Vec<Membership>,
    clients: HashMap<String, Client>,
    access_tokens: HashMap<String, AccessToken>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

impl Tables {
    fn joined(&self, membership: &Membership) -> Option<TenantMembership> {
        let tenant = self.tenants.get(&membership.tenant_id)?;

        Some(TenantMembership {
            user_id: membership.user_id,
            tenant_id: membership.tenant_id,
            tenant_name: tenant.name.clone(),
            role: membership.role.clone(),
            is_default: membership.is_default,
            active: membership.active,
            tenant_active: tenant.active,
            created_at: membership.created_at,
        })
    }

    fn membership_index(&self, user_id: Uuid, tenant_id: Uuid) -> Option<usize> {
        self.memberships
            .iter()
            .position(|m| m.user_id == user_id && m.tenant_id == tenant_id)
    }

    fn clear_default(&mut self, user_id: Uuid) {
        let now = Utc::now();
        for membership in self.memberships.iter_mut().filter(|m| m.user_id == user_id) {
            if membership.is_default {
                membership.is_default = false;
                membership.updated_at = now;
            }
        }
    }

    fn has_default(&self, user_id: Uuid) -> bool {
        self.memberships
            .iter()
            .any(|m| m.user_id == user_id && m.is_default)
    }

    fn insert_pair(&mut self, grant: TokenGrant, pending: PendingTokenPair) -> StoreResult<TokenPair> {
        if self
            .access_tokens
            .values()
            .any(|t| t.token_hash == pending.access_token_hash)
        {
            return Err(StoreError::Conflict(ACCESS_HASH_CONSTRAINT.to_string()));
        }
        if self
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == pending.refresh_token_hash)
        {
            return Err(StoreError::Conflict(REFRESH_HASH_CONSTRAINT.to_string()));
        }

        let now = Utc::now();
        let access = AccessToken {
            id: pending.access_id.clone(),
            token_hash: pending.access_token_hash,
            client_id: grant.client_id.clone(),
            user_id: grant.user_id,
            tenant_id: grant.tenant_id,
            scope: grant.scope,
            expires_at: pending.access_expires_at,
            revoked: false,
            created_at: now,
        };
        let refresh = RefreshToken {
            id: pending.refresh_id,
            token_hash: pending.refresh_token_hash,
            access_token_id: pending.access_id,
            client_id: grant.client_id,
            user_id: grant.user_id,
            tenant_id: grant.tenant_id,
            expires_at: pending.refresh_expires_at,
            revoked: false,
            created_at: now,
        };

        self.access_tokens.insert(access.id.clone(), access.clone());
        self.refresh_tokens.insert(refresh.id.clone(), refresh.clone());

        Ok(TokenPair { access, refresh })
    }
}

/// Store kept entirely in process memory
///
/// Suitable for tests and local runs; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates or deactivates a tenant
    pub async fn set_tenant_active(&self, tenant_id: Uuid, active: bool) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let tenant = tables
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", tenant_id)))?;
        tenant.active = active;
        tenant.updated_at = Utc::now();
        Ok(())
    }

    /// Activates or deactivates a membership
    pub async fn set_membership_active(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        active: bool,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .membership_index(user_id, tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("membership in tenant {}", tenant_id)))?;
        tables.memberships[index].active = active;
        tables.memberships[index].updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let email = normalize_email(&data.email);

        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(EMAIL_UNIQUE_CONSTRAINT.to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: data.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let tables = self.tables.lock().await;

        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn create_tenant_with_owner(
        &self,
        data: CreateTenant,
    ) -> StoreResult<(Tenant, TenantMembership)> {
        let mut tables = self.tables.lock().await;
        let name = data.name.trim().to_string();

        if tables.tenants.values().any(|t| t.name == name) {
            return Err(StoreError::Conflict(NAME_UNIQUE_CONSTRAINT.to_string()));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name,
            owner_id: data.owner_id,
            active: true,
            settings: data
                .settings
                .unwrap_or_else(|| JsonValue::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };
        tables.tenants.insert(tenant.id, tenant.clone());

        tables.clear_default(data.owner_id);
        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: data.owner_id,
            tenant_id: tenant.id,
            role: role::OWNER.to_string(),
            is_default: true,
            active: true,
            created_at: now,
            updated_at: now,
        };
        tables.memberships.push(membership.clone());

        let joined = tables
            .joined(&membership)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", tenant.id)))?;

        Ok((tenant, joined))
    }

    async fn find_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        Ok(self.tables.lock().await.tenants.get(&id).cloned())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>> {
        let tables = self.tables.lock().await;

        Ok(tables
            .membership_index(user_id, tenant_id)
            .and_then(|i| tables.joined(&tables.memberships[i])))
    }

    async fn find_default_membership(&self, user_id: Uuid) -> StoreResult<Option<TenantMembership>> {
        let tables = self.tables.lock().await;

        Ok(tables
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.is_default)
            .and_then(|m| tables.joined(m)))
    }

    async fn list_memberships(&self, user_id: Uuid) -> StoreResult<Vec<TenantMembership>> {
        let tables = self.tables.lock().await;

        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.joined(m))
            .collect())
    }

    async fn set_default_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>> {
        let mut tables = self.tables.lock().await;

        let Some(index) = tables.membership_index(user_id, tenant_id) else {
            return Ok(None);
        };
        match tables.joined(&tables.memberships[index]) {
            Some(target) if target.is_usable() => {}
            _ => return Ok(None),
        }

        tables.clear_default(user_id);
        tables.memberships[index].is_default = true;
        tables.memberships[index].updated_at = Utc::now();

        Ok(tables.joined(&tables.memberships[index]))
    }

    async fn upsert_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        role: &str,
    ) -> StoreResult<Membership> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        if let Some(index) = tables.membership_index(user_id, tenant_id) {
            let membership = &mut tables.memberships[index];
            membership.role = role.to_string();
            membership.active = true;
            membership.updated_at = now;
            return Ok(membership.clone());
        }

        let membership = Membership {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            role: role.to_string(),
            is_default: !tables.has_default(user_id),
            active: true,
            created_at: now,
            updated_at: now,
        };
        tables.memberships.push(membership.clone());

        Ok(membership)
    }

    async fn remove_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let mut tables = self.tables.lock().await;

        let Some(index) = tables.membership_index(user_id, tenant_id) else {
            return Ok(None);
        };
        let removed = tables.memberships.remove(index);

        if removed.is_default {
            let next = tables
                .memberships
                .iter()
                .position(|m| {
                    m.user_id == user_id
                        && tables.joined(m).is_some_and(|joined| joined.is_usable())
                });

            if let Some(next) = next {
                tables.memberships[next].is_default = true;
                tables.memberships[next].updated_at = Utc::now();
            }
        }

        Ok(Some(removed))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_client(&self, data: CreateClient) -> StoreResult<Client> {
        let mut tables = self.tables.lock().await;

        if tables.clients.contains_key(&data.id) {
            return Err(StoreError::Conflict(CLIENT_ID_CONSTRAINT.to_string()));
        }

        let now = Utc::now();
        let client = Client {
            id: data.id,
            secret_hash: data.secret_hash,
            name: data.name,
            redirect_uris: data.redirect_uris,
            grant_types: data.grant_types,
            scopes: data.scopes,
            user_id: data.user_id,
            tenant_id: data.tenant_id,
            active: true,
            created_at: now,
            updated_at: now,
        };
        tables.clients.insert(client.id.clone(), client.clone());

        Ok(client)
    }

    async fn find_client(&self, id: &str) -> StoreResult<Option<Client>> {
        Ok(self.tables.lock().await.clients.get(id).cloned())
    }

    async fn create_token_pair(
        &self,
        grant: TokenGrant,
        pending: PendingTokenPair,
    ) -> StoreResult<TokenPair> {
        self.tables.lock().await.insert_pair(grant, pending)
    }

    async fn find_access_token(&self, token_hash: &str) -> StoreResult<Option<AccessToken>> {
        let tables = self.tables.lock().await;

        Ok(tables
            .access_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let tables = self.tables.lock().await;

        Ok(tables
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        pending: PendingTokenPair,
    ) -> StoreResult<Option<TokenPair>> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let Some(consumed) = tables
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.client_id == client_id && t.is_valid_at(now))
            .cloned()
        else {
            return Ok(None);
        };

        let grant = match tables.access_tokens.get(&consumed.access_token_id) {
            Some(original) => TokenGrant {
                client_id: original.client_id.clone(),
                user_id: original.user_id,
                tenant_id: original.tenant_id,
                scope: original.scope.clone(),
            },
            None => TokenGrant {
                client_id: consumed.client_id.clone(),
                user_id: consumed.user_id,
                tenant_id: consumed.tenant_id,
                scope: String::new(),
            },
        };

        if let (Some(user_id), Some(tenant_id)) = (grant.user_id, grant.tenant_id) {
            let usable = tables
                .membership_index(user_id, tenant_id)
                .and_then(|index| tables.joined(&tables.memberships[index]))
                .is_some_and(|membership| membership.is_usable());
            if !usable {
                return Ok(None);
            }
        }

        let pair = tables.insert_pair(grant, pending)?;
        if let Some(token) = tables.refresh_tokens.get_mut(&consumed.id) {
            token.revoked = true;
        }
        Ok(Some(pair))
    }

    async fn revoke_access_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;

        match tables
            .access_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.client_id == client_id)
        {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;

        match tables
            .refresh_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.client_id == client_id)
        {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
