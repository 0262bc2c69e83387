//! # TenantGate Shared Library
//!
//! Token issuance and validation core shared by every TenantGate service.
//!
//! ## Module Organization
//!
//! - `auth`: Claims, token codec, password hashing, secrets, scopes, and the auth gate
//! - `tenancy`: Tenant context resolution and membership management
//! - `oauth`: OAuth2 grant handling, client authentication, introspection, revocation
//! - `store`: Credential store traits with Postgres and in-memory implementations
//! - `models`: Database models and their queries
//! - `db`: Connection pool and migrations

pub mod auth;
pub mod db;
pub mod models;
pub mod oauth;
pub mod store;
pub mod tenancy;

/// Current version of the TenantGate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
