//! Common test utilities for API tests
//!
//! Builds the full router over an in-memory store, so every test gets an
//! isolated set of identities, tenants, clients and tokens.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tenantgate_api::{
    app::{build_router, AppState},
    config::Config,
};
use tenantgate_shared::{auth::jwt::TokenCodec, store::MemoryStore};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-signing-key-0123456789";
pub const PASSWORD: &str = "S3cure!Passw0rd";

/// Decoded response
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Registered OAuth client
#[derive(Debug, Clone)]
pub struct TestClient {
    pub id: String,
    pub secret: String,
}

impl TestClient {
    pub fn basic_auth(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.id, self.secret)))
    }
}

/// Test context containing the router and its store
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub app: Router,
    pub codec: TokenCodec,
}

pub fn test_config() -> Config {
    Config::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://localhost/unused".to_string()),
        "JWT_SECRET" => Some(JWT_SECRET.to_string()),
        _ => None,
    })
    .unwrap()
}

impl TestContext {
    pub fn new() -> Self {
        let config = test_config();
        let codec = TokenCodec::new(JWT_SECRET, config.jwt_ttl());
        let store = Arc::new(MemoryStore::new());
        let app = build_router(AppState::new(store.clone(), config));

        Self { store, app, codec }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse { status, headers, body }
    }

    /// Sends a JSON request, optionally with a bearer token
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    /// Sends a form request authenticated as `client`
    pub async fn form(&self, uri: &str, client: &TestClient, body: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, client.basic_auth())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    /// Registers an identity and returns `(user_id, token)`
    pub async fn register(&self, email: &str) -> (String, String) {
        let response = self
            .json(
                Method::POST,
                "/v1/auth/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

        (
            response.body["user"]["id"].as_str().unwrap().to_string(),
            response.body["token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login(&self, email: &str, tenant_id: Option<&str>) -> TestResponse {
        let mut body = json!({ "email": email, "password": PASSWORD });
        if let Some(tenant_id) = tenant_id {
            body["tenant_id"] = json!(tenant_id);
        }

        self.json(Method::POST, "/v1/auth/login", None, Some(body)).await
    }

    /// Creates a tenant owned by the token's identity and returns its id
    pub async fn create_tenant(&self, token: &str, name: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/v1/tenants",
                Some(token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

        response.body["id"].as_str().unwrap().to_string()
    }

    pub async fn register_client(&self, token: &str, grant_types: &[&str], scopes: &[&str]) -> TestClient {
        let response = self
            .json(
                Method::POST,
                "/oauth/clients",
                Some(token),
                Some(json!({
                    "name": "test client",
                    "redirect_uris": ["https://app.example.com/callback"],
                    "grant_types": grant_types,
                    "scopes": scopes,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

        TestClient {
            id: response.body["client_id"].as_str().unwrap().to_string(),
            secret: response.body["client_secret"].as_str().unwrap().to_string(),
        }
    }
}
