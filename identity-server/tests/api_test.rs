//! HTTP surface tests: routing, extractors and the error envelope.

mod common;

use common::{TestApp, CLUSTER_KEY};
use http_body_util::BodyExt;
use identity_server::models::{
    AccountId, ApplicationId, EntityId, GatewayId, OrganizationId, Right, Rights,
};
use service_core::axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };

    Reply {
        status,
        headers,
        body,
    }
}

async fn owned_application(app: &TestApp, user: &str, id: &str) -> String {
    let account = app.user(user).await;
    let entity = EntityId::Application(ApplicationId::new(id));
    app.entity(&entity).await;
    app.member(&account, &entity, Rights::from([Right::ApplicationAll]))
        .await;
    app.token(user, Rights::all()).await
}

#[tokio::test]
async fn health_check_reports_store() {
    let app = TestApp::spawn();

    let reply = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
    assert_eq!(reply.body["service"], "identity-server-test");
    assert_eq!(reply.body["checks"]["store"], "up");
}

#[tokio::test]
async fn metrics_are_exposed() {
    identity_server::services::metrics::init_metrics().unwrap();
    let app = TestApp::spawn();
    send(&app, Method::GET, "/health", None, None).await;

    let reply = send(&app, Method::GET, "/metrics", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    let text = reply.body.as_str().unwrap_or_default().to_string();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn anonymous_caller_is_unauthenticated() {
    let app = TestApp::spawn();
    owned_application(&app, "alice", "app-a").await;

    let reply = send(&app, Method::GET, "/api/v3/applications/app-a/rights", None, None).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "unauthenticated");
}

#[tokio::test]
async fn malformed_api_key_is_rejected() {
    let app = TestApp::spawn();
    owned_application(&app, "alice", "app-a").await;

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/applications/app-a/rights",
        Some("Bearer application.not*valid.secret"),
        None,
    )
    .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "malformed_credential");
}

#[tokio::test]
async fn unknown_token_is_unauthenticated() {
    let app = TestApp::spawn();
    owned_application(&app, "alice", "app-a").await;

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/applications/app-a/rights",
        Some("Bearer nobody-issued-this"),
        None,
    )
    .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["name"], "unauthenticated");
}

#[tokio::test]
async fn cluster_peer_gets_all_rights() {
    let app = TestApp::spawn();
    owned_application(&app, "alice", "app-a").await;

    let request = Request::builder()
        .uri("/api/v3/applications/app-a/rights")
        .header("x-cluster-auth", CLUSTER_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let rights = body["rights"].as_array().unwrap();
    assert!(rights.contains(&json!("APPLICATION_DELETE")));

    let request = Request::builder()
        .uri("/api/v3/applications/app-a/rights")
        .header("x-cluster-auth", "definitely-not-the-key")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_key_lifecycle_over_http() {
    let app = TestApp::spawn();
    let token = owned_application(&app, "alice", "app-a").await;

    // Create
    let reply = send(
        &app,
        Method::POST,
        "/api/v3/applications/app-a/api-keys",
        Some(&token),
        Some(json!({ "name": "ci", "rights": ["APPLICATION_INFO", "APPLICATION_DEVICES_READ"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let key_id = reply.body["id"].as_str().unwrap().to_string();
    let bearer = format!("Bearer {}", reply.body["key"].as_str().unwrap());

    // Use
    let reply = send(&app, Method::GET, "/api/v3/applications/app-a", Some(&bearer), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["entity"]["id"], "app-a");

    // List
    let reply = send(
        &app,
        Method::GET,
        "/api/v3/applications/app-a/api-keys?limit=10&page=1",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-total-count"], "1");
    assert!(reply.body[0].get("key").is_none());

    // Rotate
    let uri = format!("/api/v3/applications/app-a/api-keys/{}/rotate", key_id);
    let reply = send(&app, Method::POST, &uri, Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let rotated = format!("Bearer {}", reply.body["key"].as_str().unwrap());
    assert_ne!(rotated, bearer);

    let reply = send(&app, Method::GET, "/api/v3/applications/app-a", Some(&bearer), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Update with a mask
    let uri = format!("/api/v3/applications/app-a/api-keys/{}", key_id);
    let reply = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({
            "api_key": { "name": "ci-renamed" },
            "field_mask": { "paths": ["name"] }
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "ci-renamed");

    // Delete
    let reply = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["name"], "api_key_not_found");
}

#[tokio::test]
async fn legacy_update_with_empty_rights_answers_no_content() {
    let app = TestApp::spawn();
    let alice = app.user("alice").await;
    let gateway = EntityId::Gateway(GatewayId::new("gtw-1"));
    app.entity(&gateway).await;
    app.member(&alice, &gateway, Rights::from([Right::GatewayAll]))
        .await;
    let token = app.token("alice", Rights::all()).await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v3/gateways/gtw-1/api-keys",
        Some(&token),
        Some(json!({ "name": "forwarder", "rights": ["GATEWAY_LINK"] })),
    )
    .await;
    let uri = format!(
        "/api/v3/gateways/gtw-1/api-keys/{}",
        reply.body["id"].as_str().unwrap()
    );

    let body = json!({ "api_key": { "rights": [] } });
    let reply = send(&app, Method::PUT, &uri, Some(&token), Some(body)).await;

    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn invalid_key_name_is_rejected() {
    let app = TestApp::spawn();
    let token = owned_application(&app, "alice", "app-a").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v3/applications/app-a/api-keys",
        Some(&token),
        Some(json!({ "name": "x".repeat(51), "rights": ["APPLICATION_INFO"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["name"], "validation_failed");

    let reply = send(
        &app,
        Method::POST,
        "/api/v3/applications/app-a/api-keys",
        Some(&token),
        Some(json!({ "name": "ci", "rights": ["NOT_A_RIGHT"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["name"], "malformed_body");
}

#[tokio::test]
async fn clients_do_not_have_api_keys() {
    let app = TestApp::spawn();
    let token = owned_application(&app, "alice", "app-a").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v3/clients/console/api-keys",
        Some(&token),
        Some(json!({ "name": "ci", "rights": ["CLIENT_INFO"] })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["name"], "unsupported_api_keys");
}

#[tokio::test]
async fn end_devices_are_not_addressable() {
    let app = TestApp::spawn();
    let token = owned_application(&app, "alice", "app-a").await;

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/end_devices/app-a%2Fdev-1/rights",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["name"], "unsupported_entity_kind");
}

#[tokio::test]
async fn missing_rights_are_reported_in_attributes() {
    let app = TestApp::spawn();
    owned_application(&app, "alice", "app-a").await;
    let bob = app.user("bob").await;
    app.user("carol").await;
    let entity = EntityId::Application(ApplicationId::new("app-a"));
    app.member(
        &bob,
        &entity,
        Rights::from([Right::ApplicationInfo, Right::ApplicationSettingsCollaborators]),
    )
    .await;
    let token = app.token("bob", Rights::all()).await;

    let reply = send(
        &app,
        Method::PUT,
        "/api/v3/applications/app-a/collaborators",
        Some(&token),
        Some(json!({
            "collaborator": {
                "account": { "kind": "user", "id": "carol" },
                "rights": ["APPLICATION_INFO", "APPLICATION_DELETE"]
            }
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], "permission_denied");
    assert_eq!(reply.body["name"], "missing_rights");
    assert_eq!(reply.body["attributes"]["missing_rights"], json!(["APPLICATION_DELETE"]));
}

#[tokio::test]
async fn collaborators_over_http() {
    let app = TestApp::spawn();
    let token = owned_application(&app, "alice", "app-a").await;
    app.user("bob").await;

    let reply = send(
        &app,
        Method::PUT,
        "/api/v3/applications/app-a/collaborators",
        Some(&token),
        Some(json!({
            "collaborator": {
                "account": { "kind": "user", "id": "bob" },
                "rights": ["APPLICATION_INFO"]
            }
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/applications/app-a/collaborators",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-total-count"], "2");

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/applications/app-a/collaborators/users/bob",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["rights"], json!(["APPLICATION_INFO"]));

    let reply = send(
        &app,
        Method::DELETE,
        "/api/v3/applications/app-a/collaborators/users/bob",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(
        &app,
        Method::DELETE,
        "/api/v3/applications/app-a/collaborators/users/alice",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(reply.body["name"], "entity_needs_collaborator");
}

#[tokio::test]
async fn register_and_list_memberships() {
    let app = TestApp::spawn();
    let alice = app.user("alice").await;
    let acme = AccountId::Organization(OrganizationId::new("acme"));
    app.entity(&EntityId::from(&acme)).await;
    app.member(&alice, &EntityId::from(&acme), Rights::from([Right::OrganizationAll]))
        .await;
    let token = app.token("alice", Rights::all()).await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v3/entities",
        Some(&token),
        Some(json!({
            "entity": { "kind": "application", "id": "fleet" },
            "owner": { "kind": "organization", "id": "acme" }
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/users/alice/memberships?kind=application&include_indirect=true",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-total-count"], "1");
    assert_eq!(reply.body[0]["id"], "fleet");

    let reply = send(
        &app,
        Method::GET,
        "/api/v3/users/alice/memberships?kind=application",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.headers["x-total-count"], "0");
}
