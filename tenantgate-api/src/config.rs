/// Configuration management for the API server
///
/// Loaded from environment variables (and a `.env` file if present).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: *)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `JWT_SECRET`: HMAC signing key, at least 32 characters (required)
/// - `JWT_EXPIRATION_HOURS`: Signed token lifetime, at most 8760 (default: 24)
/// - `OAUTH_ACCESS_TOKEN_TTL_SECS`: Opaque access token lifetime (default: 3600)
/// - `OAUTH_REFRESH_TOKEN_TTL_SECS`: Opaque refresh token lifetime (default: 604800)
///
/// Both `OAUTH_*_TTL_SECS` values are capped at one year.
///
/// # Example
///
/// ```no_run
/// use tenantgate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::{env, fmt, str::FromStr};

use anyhow::Context;
use chrono::Duration;
use tenantgate_shared::oauth::TokenLifetimes;

/// Minimum signing key length in bytes
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound for `JWT_EXPIRATION_HOURS` (one year)
pub const MAX_JWT_EXPIRATION_HOURS: i64 = 24 * 365;

/// Upper bound for the `OAUTH_*_TTL_SECS` lifetimes (one year)
pub const MAX_OAUTH_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub oauth: OAuthConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// `["*"]` allows any origin
    pub cors_origins: Vec<String>,
    /// Enables HSTS
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Signed token configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC key; generate with `openssl rand -hex 32`
    pub secret: String,
    pub expiration_hours: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("expiration_hours", &self.expiration_hours)
            .finish()
    }
}

/// Opaque OAuth2 token lifetimes
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Fails if a required variable is missing, a number does not parse or
    /// the signing key is too short.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LENGTH
            );
        }

        let config = Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 8080)?,
                cors_origins,
                production: parse_or(&lookup, "PRODUCTION", false)?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_hours: parse_or(&lookup, "JWT_EXPIRATION_HOURS", 24)?,
            },
            oauth: OAuthConfig {
                access_token_ttl_secs: parse_or(&lookup, "OAUTH_ACCESS_TOKEN_TTL_SECS", 3600)?,
                refresh_token_ttl_secs: parse_or(&lookup, "OAUTH_REFRESH_TOKEN_TTL_SECS", 604_800)?,
            },
        };

        check_lifetime("JWT_EXPIRATION_HOURS", config.jwt.expiration_hours, MAX_JWT_EXPIRATION_HOURS)?;
        check_lifetime(
            "OAUTH_ACCESS_TOKEN_TTL_SECS",
            config.oauth.access_token_ttl_secs,
            MAX_OAUTH_TTL_SECS,
        )?;
        check_lifetime(
            "OAUTH_REFRESH_TOKEN_TTL_SECS",
            config.oauth.refresh_token_ttl_secs,
            MAX_OAUTH_TTL_SECS,
        )?;

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Lifetime of signed tokens
    pub fn jwt_ttl(&self) -> Duration {
        Duration::hours(self.jwt.expiration_hours)
    }

    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::seconds(self.oauth.access_token_ttl_secs),
            refresh: Duration::seconds(self.oauth.refresh_token_ttl_secs),
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

fn check_lifetime(name: &str, value: i64, max: i64) -> anyhow::Result<()> {
    if value <= 0 || value > max {
        anyhow::bail!("{} must be between 1 and {}, got {}", name, max, value);
    }
    Ok(())
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, value)),
        None => Ok(default),
    }
}
