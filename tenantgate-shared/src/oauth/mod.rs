//! OAuth2 token endpoint core
//!
//! - [`client_auth`]: HTTP Basic client authentication with constant-time
//!   secret comparison
//! - [`grant`]: The grant handler (client_credentials, password,
//!   refresh_token) producing opaque token pairs
//! - [`lifecycle`]: Token introspection and revocation
//! - [`error`]: The fixed OAuth2 error code set
//!
//! Opaque tokens are random strings; only their SHA-256 digests are stored.

pub mod client_auth;
pub mod error;
pub mod grant;
pub mod lifecycle;

pub use client_auth::{authenticate_client, client_auth, AuthenticatedClient};
pub use error::OAuthError;
pub use grant::{GrantHandler, GrantType, TokenLifetimes, TokenRequest, TokenResponse};
pub use lifecycle::{introspect, revoke, Introspection, TokenLookupRequest, TokenTypeHint};
