/// Opaque secrets and identifiers
///
/// OAuth2 access tokens, refresh tokens and client secrets are random
/// base62 strings. Only their SHA-256 digests are persisted, and lookups
/// hash the presented value first.
///
/// # Formats
///
/// | Kind           | Format                          |
/// |----------------|---------------------------------|
/// | Opaque token   | 48 chars `[A-Za-z0-9]`          |
/// | Client secret  | 48 chars `[A-Za-z0-9]`          |
/// | Client id      | `cli_` + 32 hex chars           |
/// | Access id      | `tok_` + 32 hex chars           |
/// | Refresh id     | `ref_` + 32 hex chars           |
///
/// # Example
///
/// ```
/// use tenantgate_shared::auth::secret::{generate_token, hash_secret, verify_secret};
///
/// let token = generate_token();
/// let stored = hash_secret(&token);
///
/// assert!(verify_secret(&token, &stored));
/// assert!(!verify_secret("something-else", &stored));
/// ```

use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Length of opaque tokens and client secrets
pub const SECRET_LENGTH: usize = 48;

/// Prefix for OAuth2 client ids
pub const CLIENT_ID_PREFIX: &str = "cli_";

/// Prefix for access token record ids
pub const ACCESS_TOKEN_ID_PREFIX: &str = "tok_";

/// Prefix for refresh token record ids
pub const REFRESH_TOKEN_ID_PREFIX: &str = "ref_";

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(length: usize) -> String {
    let mut rng = OsRng;

    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generates an opaque bearer token
pub fn generate_token() -> String {
    random_string(SECRET_LENGTH)
}

/// Generates a client secret
pub fn generate_client_secret() -> String {
    random_string(SECRET_LENGTH)
}

/// Generates a prefixed record id from 16 random bytes
///
/// ```
/// use tenantgate_shared::auth::secret::{generate_id, CLIENT_ID_PREFIX};
///
/// let id = generate_id(CLIENT_ID_PREFIX);
/// assert!(id.starts_with("cli_"));
/// assert_eq!(id.len(), 36);
/// ```
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", prefix, hex::encode(bytes))
}

/// Hex-encoded SHA-256 digest of a secret
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Checks a presented secret against a stored digest in constant time
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_secret(presented).as_bytes(), stored_hash.as_bytes())
}

/// Compares two byte strings without short-circuiting on the first difference
///
/// Length is not secret here: both sides are fixed-length digests.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
