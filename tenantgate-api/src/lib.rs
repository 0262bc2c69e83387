//! # TenantGate API Server Library
//!
//! HTTP surface over the `tenantgate-shared` core: identity registration and
//! login, tenant management and switching, OAuth2 client registration and
//! the token, introspection, revocation and userinfo endpoints.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security response headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
