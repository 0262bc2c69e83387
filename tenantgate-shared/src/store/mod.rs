/// Credential store
///
/// The relational database is the only shared mutable state in the system.
/// Components talk to it through the traits below, so the same resolver and
/// grant handler run against [`PgStore`] in production and [`MemoryStore`]
/// in tests.
///
/// Every method that touches more than one row is atomic: either all of its
/// writes are visible afterwards or none are.
///
/// # Example
///
/// ```
/// use tenantgate_shared::models::user::CreateUser;
/// use tenantgate_shared::store::{IdentityStore, MemoryStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let user = store.create_user(CreateUser {
///     email: "User@Example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// assert_eq!(user.email, "user@example.com");
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::client::{Client, CreateClient};
use crate::models::membership::{Membership, TenantMembership};
use crate::models::tenant::{CreateTenant, Tenant};
use crate::models::token::{AccessToken, PendingTokenPair, RefreshToken, TokenGrant, TokenPair};
use crate::models::user::{CreateUser, User};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the constraint name
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Returns true if this is a conflict on the named constraint
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, StoreError::Conflict(name) if name == constraint)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identity persistence
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates an identity; a taken email is a conflict on `users_email_key`
    async fn create_user(&self, data: CreateUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Looks up by normalized email
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

/// Tenant and membership persistence
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Creates a tenant and its owner's membership in one transaction
    ///
    /// The owner membership becomes the owner's default; any previous default
    /// is cleared.
    async fn create_tenant_with_owner(
        &self,
        data: CreateTenant,
    ) -> StoreResult<(Tenant, TenantMembership)>;

    async fn find_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>>;

    /// Membership of `user_id` in `tenant_id`, whatever its active state
    async fn find_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>>;

    async fn find_default_membership(&self, user_id: Uuid) -> StoreResult<Option<TenantMembership>>;

    /// All memberships of a user, oldest first
    async fn list_memberships(&self, user_id: Uuid) -> StoreResult<Vec<TenantMembership>>;

    /// Makes `tenant_id` the user's only default membership
    ///
    /// Returns `None` without changing anything when the membership is
    /// missing or not usable.
    async fn set_default_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<TenantMembership>>;

    /// Adds a membership or updates the role of an existing one
    ///
    /// A new membership becomes the user's default if they have none.
    async fn upsert_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        role: &str,
    ) -> StoreResult<Membership>;

    /// Deletes a membership and returns it
    ///
    /// If it was the user's default, the oldest remaining usable membership
    /// becomes the default, or none if there is none.
    async fn remove_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<Membership>>;
}

/// OAuth2 client and opaque token persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_client(&self, data: CreateClient) -> StoreResult<Client>;

    async fn find_client(&self, id: &str) -> StoreResult<Option<Client>>;

    /// Stores an access token and its paired refresh token together
    async fn create_token_pair(
        &self,
        grant: TokenGrant,
        pending: PendingTokenPair,
    ) -> StoreResult<TokenPair>;

    async fn find_access_token(&self, token_hash: &str) -> StoreResult<Option<AccessToken>>;

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;

    /// Consumes a live refresh token and stores its replacement pair
    ///
    /// The presented token must belong to `client_id`, be unrevoked and
    /// unexpired. The new pair carries the identity, tenant and scope of the
    /// access token the old refresh token was paired with. A carried tenant
    /// must still have a usable membership for the identity. Returns `None`
    /// when any precondition fails, leaving the presented token untouched;
    /// of two concurrent calls with the same token at most one succeeds.
    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        pending: PendingTokenPair,
    ) -> StoreResult<Option<TokenPair>>;

    /// Revokes an access token owned by `client_id`; false if none matched
    async fn revoke_access_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool>;

    /// Revokes a refresh token owned by `client_id`; false if none matched
    async fn revoke_refresh_token(&self, token_hash: &str, client_id: &str) -> StoreResult<bool>;
}

/// Everything a service needs from persistence
#[async_trait]
pub trait Store: IdentityStore + TenantStore + CredentialStore {
    /// Checks store connectivity
    async fn ping(&self) -> StoreResult<()>;
}
