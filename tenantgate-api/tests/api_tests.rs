/// End-to-end tests for the TenantGate API
///
/// Every test drives the full router (gates, handlers, error mapping and
/// middleware) over an in-memory store:
/// - Registration, login and tenant resolution
/// - Tenant management and switching
/// - OAuth2 client registration and grants
/// - Introspection, revocation and the opaque-token gate

mod common;

use axum::http::{header, Method, StatusCode};
use common::{TestClient, TestContext};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_check_and_request_id() {
    let ctx = TestContext::new();

    let response = ctx.json(Method::GET, "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["database"], "connected");
    assert!(response.headers.get("x-request-id").is_some());
    assert_eq!(response.headers.get("x-content-type-options").unwrap(), "nosniff");
}

#[tokio::test]
async fn test_register_validation_and_conflict() {
    let ctx = TestContext::new();
    ctx.register("dup@example.com").await;

    let response = ctx
        .json(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "email": "DUP@example.com", "password": common::PASSWORD })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "conflict");

    let response = ctx
        .json(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "email": "weak@example.com", "password": "password" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["details"][0]["field"], "password");

    let response = ctx
        .json(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "email": "not-an-email", "password": common::PASSWORD })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_malformed_json_uses_error_shape() {
    let ctx = TestContext::new();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
    assert!(response.body["error_description"].is_string());
}

#[tokio::test]
async fn test_owner_login_with_tenant_and_isolation() {
    let ctx = TestContext::new();
    let (u1, token1) = ctx.register("u1@example.com").await;
    let (_, token2) = ctx.register("u2@example.com").await;

    let t1 = ctx.create_tenant(&token1, "tenant-one").await;
    let t2 = ctx.create_tenant(&token2, "tenant-two").await;

    let listing = ctx.json(Method::GET, "/v1/tenants", Some(&token1), None).await;
    assert_eq!(listing.status, StatusCode::OK);
    let tenants = listing.body["tenants"].as_array().unwrap();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["tenant_id"], t1.as_str());
    assert_eq!(tenants[0]["role"], "owner");
    assert_eq!(tenants[0]["is_default"], true);

    let response = ctx.login("u1@example.com", Some(&t1)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["id"], u1.as_str());
    assert!(response.body["user"].get("password_hash").is_none());

    let claims = ctx
        .codec
        .decode(response.body["token"].as_str().unwrap())
        .unwrap();
    let tenant = claims.tenant().unwrap();
    assert_eq!(tenant.tenant_id.to_string(), t1);
    assert_eq!(tenant.tenant_name, "tenant-one");
    assert_eq!(tenant.role, "owner");

    let response = ctx.login("u1@example.com", Some(&t2)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "access_denied");

    let response = ctx
        .json(Method::GET, &format!("/v1/tenants/{}", t2), Some(&token1), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let ctx = TestContext::new();
    ctx.register("known@example.com").await;

    let wrong_password = ctx
        .json(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "known@example.com", "password": "Wr0ng!password" })),
        )
        .await;
    let unknown_email = ctx
        .json(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": common::PASSWORD })),
        )
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn test_login_uses_default_tenant() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("default@example.com").await;

    let response = ctx.login("default@example.com", None).await;
    assert!(response.body.get("tenant").is_none());

    let first = ctx.create_tenant(&token, "first").await;
    let second = ctx.create_tenant(&token, "second").await;

    // The most recently created tenant is the default
    let response = ctx.login("default@example.com", None).await;
    assert_eq!(response.body["tenant"]["tenant_id"], second.as_str());

    let response = ctx
        .json(
            Method::POST,
            "/v1/tenants/default",
            Some(&token),
            Some(json!({ "tenant_id": first })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["is_default"], true);

    let response = ctx.login("default@example.com", None).await;
    assert_eq!(response.body["tenant"]["tenant_id"], first.as_str());

    let listing = ctx.json(Method::GET, "/v1/tenants", Some(&token), None).await;
    let defaults = listing.body["tenants"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["is_default"] == true)
        .count();
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn test_auth_gate_rejections() {
    let ctx = TestContext::new();

    let response = ctx.json(Method::GET, "/v1/auth/me", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.headers.contains_key(header::WWW_AUTHENTICATE));

    let response = ctx.json(Method::GET, "/v1/auth/me", Some("not.a.token"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_token");

    let (user_id, token) = ctx.register("me@example.com").await;
    let mut tampered = token.clone().into_bytes();
    let index = tampered.len() - 10;
    tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let response = ctx.json(Method::GET, "/v1/auth/me", Some(&tampered), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = ctx.json(Method::GET, "/v1/auth/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user_id"], user_id.as_str());
    assert_eq!(response.body["email"], "me@example.com");
}

#[tokio::test]
async fn test_tenant_required_route_and_switch() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("switch@example.com").await;
    let (_, other_token) = ctx.register("other@example.com").await;

    let response = ctx.json(Method::GET, "/v1/tenant/context", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "tenant_required");

    let tenant_id = ctx.create_tenant(&token, "switchable").await;
    let foreign = ctx.create_tenant(&other_token, "foreign").await;

    let response = ctx
        .json(
            Method::POST,
            "/v1/tenants/switch",
            Some(&token),
            Some(json!({ "tenant_id": foreign })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .json(
            Method::POST,
            "/v1/tenants/switch",
            Some(&token),
            Some(json!({ "tenant_id": tenant_id })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let switched = response.body["token"].as_str().unwrap().to_string();

    let response = ctx
        .json(Method::GET, "/v1/tenant/context", Some(&switched), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["tenant"]["tenant_id"], tenant_id.as_str());
    assert_eq!(response.body["tenant"]["role"], "owner");

    // The original token is untouched by the switch
    let response = ctx.json(Method::GET, "/v1/tenant/context", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_management() {
    let ctx = TestContext::new();
    let (owner_id, owner) = ctx.register("owner@example.com").await;
    let (member_id, member) = ctx.register("member@example.com").await;
    let tenant_id = ctx.create_tenant(&owner, "team").await;

    let response = ctx
        .json(
            Method::POST,
            &format!("/v1/tenants/{}/members", tenant_id),
            Some(&owner),
            Some(json!({ "email": "member@example.com" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["role"], "member");
    assert_eq!(response.body["is_default"], true);

    let response = ctx.login("member@example.com", Some(&tenant_id)).await;
    assert_eq!(response.body["tenant"]["role"], "member");

    // Members cannot manage members
    let response = ctx
        .json(
            Method::DELETE,
            &format!("/v1/tenants/{}/members/{}", tenant_id, owner_id),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .json(
            Method::POST,
            &format!("/v1/tenants/{}/members", tenant_id),
            Some(&owner),
            Some(json!({ "email": "member@example.com", "role": "admin" })),
        )
        .await;
    assert_eq!(response.body["role"], "admin");

    // Even an admin cannot remove the owner
    let response = ctx
        .json(
            Method::DELETE,
            &format!("/v1/tenants/{}/members/{}", tenant_id, owner_id),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .json(
            Method::POST,
            &format!("/v1/tenants/{}/members", tenant_id),
            Some(&owner),
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = ctx
        .json(
            Method::DELETE,
            &format!("/v1/tenants/{}/members/{}", tenant_id, member_id),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = ctx.login("member@example.com", Some(&tenant_id)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx.login("member@example.com", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.get("tenant").is_none());
}

#[tokio::test]
async fn test_invalid_path_uses_error_shape() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("path@example.com").await;

    let response = ctx
        .json(Method::GET, "/v1/tenants/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
}

#[tokio::test]
async fn test_client_registration() {
    let ctx = TestContext::new();
    let (user_id, token) = ctx.register("dev@example.com").await;

    let response = ctx
        .json(
            Method::POST,
            "/oauth/clients",
            Some(&token),
            Some(json!({
                "name": "bad",
                "grant_types": ["implicit"],
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["details"][0]["field"], "grant_types");

    let client = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;
    assert!(client.id.starts_with("cli_"));
    assert_eq!(client.secret.len(), 48);

    let request = axum::http::Request::builder()
        .uri(format!("/oauth/clients/{}", client.id))
        .header(header::AUTHORIZATION, client.basic_auth())
        .body(axum::body::Body::empty())
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user_id"], user_id.as_str());
    assert!(response.body.get("secret_hash").is_none());

    let request = axum::http::Request::builder()
        .uri("/oauth/clients/cli_someoneelse")
        .header(header::AUTHORIZATION, client.basic_auth())
        .body(axum::body::Body::empty())
        .unwrap();
    assert_eq!(ctx.send(request).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_credentials_scope_negotiation() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("cc@example.com").await;
    let client = ctx
        .register_client(&token, &["client_credentials"], &["read", "write"])
        .await;

    let response = ctx
        .form(
            "/oauth/token",
            &client,
            "grant_type=client_credentials&scope=read+write+delete",
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["scope"], "read write");
    assert_eq!(response.body["token_type"], "Bearer");
    assert_eq!(response.body["expires_in"], 3600);
    assert!(response.body["refresh_token"].is_string());

    let access_token = response.body["access_token"].as_str().unwrap();
    let introspection = ctx
        .form("/oauth/introspect", &client, &format!("token={}", access_token))
        .await;
    assert_eq!(introspection.body["active"], true);
    assert_eq!(introspection.body["client_id"], client.id.as_str());
    assert!(introspection.body.get("user_id").is_none());
    assert!(introspection.body.get("tenant_id").is_none());
}

#[tokio::test]
async fn test_client_authentication_failures() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("auth@example.com").await;
    let client = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;

    let wrong_secret = TestClient {
        id: client.id.clone(),
        secret: "wrong".to_string(),
    };
    let response = ctx
        .form("/oauth/token", &wrong_secret, "grant_type=client_credentials")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_client");
    assert_eq!(
        response.headers.get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"oauth\""
    );

    let unknown = TestClient {
        id: "cli_unknown".to_string(),
        secret: client.secret.clone(),
    };
    let response = ctx
        .form("/oauth/token", &unknown, "grant_type=client_credentials")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_client");
}

#[tokio::test]
async fn test_grant_dispatch_errors() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("dispatch@example.com").await;
    let client = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;

    let response = ctx.form("/oauth/token", &client, "scope=read").await;
    assert_eq!(response.body["error"], "invalid_request");

    let response = ctx.form("/oauth/token", &client, "grant_type=implicit").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "unsupported_grant_type");

    let response = ctx
        .form(
            "/oauth/token",
            &client,
            "grant_type=password&username=dispatch@example.com&password=x",
        )
        .await;
    assert_eq!(response.body["error"], "unauthorized_client");

    // A JSON body is not a form
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/oauth/token")
        .header(header::AUTHORIZATION, client.basic_auth())
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(r#"{"grant_type":"client_credentials"}"#))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
}

#[tokio::test]
async fn test_password_grant_binds_tenant() {
    let ctx = TestContext::new();
    let (user_id, token) = ctx.register("pw@example.com").await;
    let (_, stranger) = ctx.register("stranger@example.com").await;
    let tenant_id = ctx.create_tenant(&token, "pw-tenant").await;
    let foreign = ctx.create_tenant(&stranger, "pw-foreign").await;
    let client = ctx
        .register_client(&token, &["password", "refresh_token"], &["read"])
        .await;

    let body = format!(
        "grant_type=password&username=pw@example.com&password={}&tenant_id={}",
        "S3cure%21Passw0rd", tenant_id
    );
    let response = ctx.form("/oauth/token", &client, &body).await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);

    let access_token = response.body["access_token"].as_str().unwrap();
    let introspection = ctx
        .form("/oauth/introspect", &client, &format!("token={}", access_token))
        .await;
    assert_eq!(introspection.body["user_id"], user_id.as_str());
    assert_eq!(introspection.body["tenant_id"], tenant_id.as_str());

    let body = format!(
        "grant_type=password&username=pw@example.com&password={}&tenant_id={}",
        "S3cure%21Passw0rd", foreign
    );
    let response = ctx.form("/oauth/token", &client, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_grant");

    let response = ctx
        .form(
            "/oauth/token",
            &client,
            "grant_type=password&username=pw@example.com&password=wrong",
        )
        .await;
    assert_eq!(response.body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("refresh@example.com").await;
    let client = ctx
        .register_client(&token, &["client_credentials", "refresh_token"], &["read", "write"])
        .await;

    let issued = ctx
        .form("/oauth/token", &client, "grant_type=client_credentials&scope=write")
        .await;
    let refresh_token = issued.body["refresh_token"].as_str().unwrap().to_string();
    let body = format!("grant_type=refresh_token&refresh_token={}", refresh_token);

    let first = ctx.form("/oauth/token", &client, &body).await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);
    assert_eq!(first.body["scope"], "write");
    assert_ne!(first.body["refresh_token"], refresh_token.as_str());

    let second = ctx.form("/oauth/token", &client, &body).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.body["error"], "invalid_grant");

    // The rotated refresh token works exactly once as well
    let rotated = format!(
        "grant_type=refresh_token&refresh_token={}",
        first.body["refresh_token"].as_str().unwrap()
    );
    assert_eq!(ctx.form("/oauth/token", &client, &rotated).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_bound_to_client() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("bound@example.com").await;
    let first = ctx
        .register_client(&token, &["client_credentials", "refresh_token"], &["read"])
        .await;
    let second = ctx
        .register_client(&token, &["client_credentials", "refresh_token"], &["read"])
        .await;

    let issued = ctx
        .form("/oauth/token", &first, "grant_type=client_credentials")
        .await;
    let body = format!(
        "grant_type=refresh_token&refresh_token={}",
        issued.body["refresh_token"].as_str().unwrap()
    );

    let response = ctx.form("/oauth/token", &second, &body).await;
    assert_eq!(response.body["error"], "invalid_grant");

    // The failed attempt did not consume it
    let response = ctx.form("/oauth/token", &first, &body).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_revoke_then_introspect_and_userinfo() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("revoke@example.com").await;
    let client = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;

    let issued = ctx
        .form("/oauth/token", &client, "grant_type=client_credentials")
        .await;
    let access_token = issued.body["access_token"].as_str().unwrap().to_string();

    let response = ctx
        .json(Method::GET, "/oauth/userinfo", Some(&access_token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["client_id"], client.id.as_str());
    assert_eq!(response.body["scopes"], json!(["read"]));

    let response = ctx
        .form(
            "/oauth/revoke",
            &client,
            &format!("token={}&token_type_hint=access_token", access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let introspection = ctx
        .form("/oauth/introspect", &client, &format!("token={}", access_token))
        .await;
    assert_eq!(introspection.status, StatusCode::OK);
    assert_eq!(introspection.body, json!({ "active": false }));

    let response = ctx
        .json(Method::GET, "/oauth/userinfo", Some(&access_token), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // Revoking again, or revoking garbage, still succeeds
    let response = ctx
        .form("/oauth/revoke", &client, &format!("token={}", access_token))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let response = ctx.form("/oauth/revoke", &client, "token=nonsense").await;
    assert_eq!(response.status, StatusCode::OK);

    let response = ctx.form("/oauth/revoke", &client, "").await;
    assert_eq!(response.body["error"], "invalid_request");
}

#[tokio::test]
async fn test_revocation_is_scoped_to_client() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("scoped@example.com").await;
    let owner = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;
    let other = ctx
        .register_client(&token, &["client_credentials"], &["read"])
        .await;

    let issued = ctx
        .form("/oauth/token", &owner, "grant_type=client_credentials")
        .await;
    let access_token = issued.body["access_token"].as_str().unwrap();

    let response = ctx
        .form("/oauth/revoke", &other, &format!("token={}", access_token))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let introspection = ctx
        .form("/oauth/introspect", &owner, &format!("token={}", access_token))
        .await;
    assert_eq!(introspection.body["active"], true);
}

#[tokio::test]
async fn test_inactive_tenant_is_not_resolved() {
    let ctx = TestContext::new();
    let (_, token) = ctx.register("inactive@example.com").await;
    let tenant_id = ctx.create_tenant(&token, "dormant").await;

    ctx.store
        .set_tenant_active(Uuid::parse_str(&tenant_id).unwrap(), false)
        .await
        .unwrap();

    let response = ctx.login("inactive@example.com", Some(&tenant_id)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx.login("inactive@example.com", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.get("tenant").is_none());
}
