/// Middleware modules for the API server
///
/// Authentication gates live in `tenantgate_shared::auth::middleware` and
/// `tenantgate_shared::oauth::client_auth`; request ids and access logs come
/// from tower-http. This module holds what is specific to this server:
///
/// - `security`: Security response headers

pub mod security;
