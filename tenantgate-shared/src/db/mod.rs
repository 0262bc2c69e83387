/// Postgres plumbing for [`crate::store::PgStore`]
///
/// - `pool`: Connection pool creation, health check and shutdown
/// - `migrations`: Embedded schema migrations from the workspace `migrations/` directory
///
/// # Example
///
/// ```no_run
/// use tenantgate_shared::db::{migrations::run_migrations, pool::{create_pool, DatabaseConfig}};
/// use tenantgate_shared::store::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// run_migrations(&pool).await?;
/// let store = PgStore::new(pool);
/// # Ok(())
/// # }
/// ```

pub mod migrations;
pub mod pool;
