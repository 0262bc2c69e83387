/// Database models
///
/// Each model owns the SQL for its table. Query functions are generic over
/// [`sqlx::postgres::PgExecutor`], so the same function runs against the pool
/// or inside a transaction (`&mut *tx`).
///
/// # Models
///
/// - `user`: Identities
/// - `tenant`: Organizational boundaries
/// - `membership`: Identity-tenant associations with role and default flag
/// - `client`: OAuth2 client applications
/// - `token`: Opaque OAuth2 access and refresh tokens
///
/// # Example
///
/// ```no_run
/// use tenantgate_shared::db::pool::{create_pool, DatabaseConfig};
/// use tenantgate_shared::models::user::{CreateUser, User};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, &CreateUser {
///     email: "user@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let mut tx = pool.begin().await?;
/// let found = User::find_by_id(&mut *tx, user.id).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod client;
pub mod membership;
pub mod tenant;
pub mod token;
pub mod user;
