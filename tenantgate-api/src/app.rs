/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenantgate_api::{app::AppState, config::Config};
/// use tenantgate_shared::{db::pool::{create_pool, DatabaseConfig}, store::PgStore};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(DatabaseConfig {
///     url: config.database.url.clone(),
///     ..DatabaseConfig::default()
/// }).await?;
/// let state = AppState::new(Arc::new(PgStore::new(pool)), config);
/// let app = tenantgate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tenantgate_shared::{
    auth::{
        jwt::TokenCodec,
        middleware::{jwt_auth, opaque_token_auth, require_tenant, BearerGate},
    },
    oauth::{client_auth, GrantHandler},
    store::Store,
    tenancy::TenantResolver,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Credential store (Postgres in production, in-memory in tests)
    pub store: Arc<dyn Store>,

    /// Signed-token codec holding the signing key and lifetime
    pub codec: Arc<TokenCodec>,

    pub tenants: TenantResolver<dyn Store>,

    pub grants: Arc<GrantHandler<dyn Store>>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let codec = TokenCodec::new(config.jwt.secret.as_bytes(), config.jwt_ttl());
        let grants = GrantHandler::new(Arc::clone(&store), config.token_lifetimes());

        Self {
            tenants: TenantResolver::new(Arc::clone(&store)),
            grants: Arc::new(grants),
            codec: Arc::new(codec),
            store,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                              # Store connectivity (public)
/// ├── /v1/
/// │   ├── /auth/
/// │   │   ├── POST /register               # public
/// │   │   ├── POST /login                  # public
/// │   │   └── GET  /me                     # signed token
/// │   ├── /tenants/                        # signed token
/// │   │   ├── POST   /
/// │   │   ├── GET    /
/// │   │   ├── GET    /:id
/// │   │   ├── POST   /switch
/// │   │   ├── POST   /default
/// │   │   ├── POST   /:id/members
/// │   │   └── DELETE /:id/members/:user_id
/// │   └── GET /tenant/context              # signed token with tenant
/// └── /oauth/
///     ├── POST /clients                    # signed token
///     ├── GET  /clients/:id                # client auth
///     ├── POST /token                      # client auth
///     ├── POST /introspect                 # client auth
///     ├── POST /revoke                     # client auth
///     └── GET  /userinfo                   # opaque access token
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. `x-request-id` assignment (UUID v4) and propagation to the response
/// 2. Logging (tower-http TraceLayer)
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
/// 5. Authentication (per route group)
pub fn build_router(state: AppState) -> Router {
    let signed_token = from_fn_with_state(Arc::clone(&state.codec), jwt_auth);
    let client_authentication =
        from_fn_with_state(Arc::clone(&state.store), client_auth::<dyn Store>);
    let opaque_token = from_fn_with_state(
        BearerGate::new(Arc::clone(&state.store)),
        opaque_token_auth::<dyn Store>,
    );

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/me", get(routes::auth::me))
        .route_layer(signed_token.clone())
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    let tenant_routes = Router::new()
        .route(
            "/",
            post(routes::tenants::create_tenant).get(routes::tenants::list_tenants),
        )
        .route("/switch", post(routes::tenants::switch_tenant))
        .route("/default", post(routes::tenants::set_default_tenant))
        .route("/:id", get(routes::tenants::get_tenant))
        .route("/:id/members", post(routes::tenants::add_member))
        .route("/:id/members/:user_id", delete(routes::tenants::remove_member))
        .route_layer(signed_token.clone());

    let tenant_scoped_routes = Router::new()
        .route("/context", get(routes::tenants::tenant_context))
        .route_layer(from_fn(require_tenant))
        .route_layer(signed_token.clone());

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/tenants", tenant_routes)
        .nest("/tenant", tenant_scoped_routes);

    let oauth_routes = Router::new()
        .merge(
            Router::new()
                .route("/clients", post(routes::clients::register_client))
                .route_layer(signed_token),
        )
        .merge(
            Router::new()
                .route("/clients/:id", get(routes::clients::get_client))
                .route("/token", post(routes::oauth::token))
                .route("/introspect", post(routes::oauth::introspect))
                .route("/revoke", post(routes::oauth::revoke))
                .route_layer(client_authentication),
        )
        .merge(
            Router::new()
                .route("/userinfo", get(routes::oauth::userinfo))
                .route_layer(opaque_token),
        );

    let cors = cors_layer(&state.config);
    let security = SecurityHeadersLayer::new(state.config.api.production);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .nest("/oauth", oauth_routes)
        .layer(security)
        .layer(cors)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");

                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id,
                            )
                        })
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Permissive when `CORS_ORIGINS` contains `*`, otherwise the listed origins
fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
