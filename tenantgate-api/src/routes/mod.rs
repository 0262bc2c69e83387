/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login and profile
/// - `tenants`: Tenant management, switching and membership
/// - `clients`: OAuth2 client registration
/// - `oauth`: Token, introspection, revocation and userinfo endpoints

pub mod auth;
pub mod clients;
pub mod health;
pub mod oauth;
pub mod tenants;
