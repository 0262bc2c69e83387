/// Signed token codec
///
/// Encodes [`Claims`] into compact HS256 JWTs and decodes them back.
///
/// # Security
///
/// - **Algorithm**: HS256 only; tokens whose header names another algorithm are rejected
/// - **Signature first**: the HMAC over `header.payload` is checked before any
///   segment is parsed, so any altered byte surfaces as a signature failure
/// - **Expiry**: checked on every decode with zero leeway (`now >= exp` is expired)
/// - **Key material**: injected at construction; there is no process-wide secret
///
/// # Errors
///
/// | Condition                         | Error                            |
/// |-----------------------------------|----------------------------------|
/// | Wrong segment count, bad JSON     | [`TokenError::Malformed`]        |
/// | MAC mismatch                      | [`TokenError::InvalidSignature`] |
/// | Header algorithm is not HS256     | [`TokenError::AlgorithmMismatch`]|
/// | `now >= exp`                      | [`TokenError::Expired`]          |
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use tenantgate_shared::auth::jwt::{TokenCodec, TokenError};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let codec = TokenCodec::new("a-signing-key-of-at-least-32-bytes!!", Duration::hours(1));
/// let (token, _) = codec.issue(Uuid::new_v4(), "user@example.com", None)?;
///
/// let other = TokenCodec::new("some-other-signing-key-32-bytes-long", Duration::hours(1));
/// assert!(matches!(other.decode(&token), Err(TokenError::InvalidSignature)));
/// # Ok(())
/// # }
/// ```

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::Sha256;
use uuid::Uuid;

use super::claims::{Claims, TenantContext};

type HmacSha256 = Hmac<Sha256>;

/// The only accepted signing algorithm
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Error type for token encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Failed to sign the claims
    #[error("Failed to encode token: {0}")]
    Encode(String),

    /// Token is not a well-formed JWT carrying our claims
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// MAC does not match
    #[error("Token signature is invalid")]
    InvalidSignature,

    /// Header names an algorithm other than HS256
    #[error("Token algorithm is not {expected:?}")]
    AlgorithmMismatch { expected: Algorithm },

    /// Token has expired
    #[error("Token has expired")]
    Expired,
}

impl TokenError {
    /// True for signature and algorithm failures
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            TokenError::InvalidSignature | TokenError::AlgorithmMismatch { .. }
        )
    }
}

/// HS256 codec bound to one signing key and token lifetime
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &ALGORITHM)
            .field("ttl_seconds", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec for the given signing key and lifetime
    ///
    /// The key should be at least 32 bytes; the API config enforces that.
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        let secret = secret.as_ref().to_vec();

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        // exp is compared explicitly with `now >= exp` after decoding
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            secret,
            validation,
            ttl,
        }
    }

    /// Lifetime applied by [`TokenCodec::issue`]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs claims into a compact token
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Builds claims with the codec's lifetime and signs them
    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        tenant: Option<TenantContext>,
    ) -> Result<(String, Claims), TokenError> {
        let claims = Claims::new(user_id, email, tenant, self.ttl);
        let token = self.encode(&claims)?;
        Ok((token, claims))
    }

    /// Verifies a token and returns its claims
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_signature(token)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => TokenError::AlgorithmMismatch {
                    expected: ALGORITHM,
                },
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        let claims = data.claims;
        if !claims.has_consistent_tenant() {
            return Err(TokenError::Malformed(
                "tenant_id, tenant_name and role must appear together".to_string(),
            ));
        }

        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn verify_signature(&self, token: &str) -> Result<(), TokenError> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| TokenError::Malformed("expected three segments".to_string()))?;

        if signing_input.split('.').count() != 2 {
            return Err(TokenError::Malformed("expected three segments".to_string()));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidSignature)?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)
    }
}
