/// Authentication primitives
///
/// # Modules
///
/// - [`claims`]: Token payload (identity plus optional tenant context)
/// - [`jwt`]: HS256 token codec with explicit expiry checks
/// - [`password`]: Argon2id password hashing
/// - [`secret`]: Opaque tokens, client secrets, ids, constant-time comparison
/// - [`scope`]: Space-delimited scope parsing and negotiation
/// - [`middleware`]: Auth gate for signed and opaque bearer tokens
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use tenantgate_shared::auth::jwt::TokenCodec;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let codec = TokenCodec::new("a-signing-key-of-at-least-32-bytes!!", Duration::hours(24));
/// let (token, claims) = codec.issue(Uuid::new_v4(), "user@example.com", None)?;
///
/// let decoded = codec.decode(&token)?;
/// assert_eq!(decoded, claims);
/// # Ok(())
/// # }
/// ```

pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod scope;
pub mod secret;
