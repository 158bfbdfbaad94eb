//! API integration tests, driven in-process against the in-memory store

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use equiplend_server::{
    api::create_router,
    config::{AppConfig, BootstrapAdmin, StorageBackend},
    repository::Repository,
    AppState,
};

const ADMIN_PASSWORD: &str = "admin-pass";

/// Build a router over a fresh store with one bootstrap admin
async fn app() -> Router {
    let mut config = AppConfig::default();
    config.database.backend = StorageBackend::Memory;
    config.auth.jwt_secret = "integration-secret".into();
    config.auth.bootstrap_admin = Some(BootstrapAdmin {
        username: "admin".into(),
        email: "admin@example.org".into(),
        password: ADMIN_PASSWORD.into(),
        first_name: "System".into(),
        last_name: "Administrator".into(),
    });

    let state = AppState::new(config, Repository::in_memory());
    state.services.users.ensure_bootstrap_admin().await.unwrap();
    create_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(format!("/api/v1{}", uri));
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

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, login: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email_or_username": login, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    assert_eq!(body["token_type"], "Bearer");
    body["token"].as_str().unwrap().to_string()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "first_name": "Test",
            "last_name": "User",
            "email": format!("{}@example.org", username),
            "username": username,
            "password": "user-pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    assert_eq!(body["role"], "user");
    assert!(body.get("password").is_none());
    login(app, username, "user-pass").await
}

async fn create_equipment(app: &Router, admin: &str, serial: &str, quantity: i32) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/equipment",
        Some(admin),
        Some(json!({
            "name": "Projector",
            "full_name": "Epson EB-W49",
            "serial_number": serial,
            "quantity": quantity,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create equipment failed: {}", body);
    body["id"].as_i64().unwrap()
}

fn borrow(equipment_id: i64, quantity: i32) -> Value {
    json!({
        "equipment_id": equipment_id,
        "quantity": quantity,
        "reason": "Team offsite",
        "due_date": (Utc::now() + Duration::days(3)).to_rfc3339(),
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_unauthenticated_requests_are_refused() {
    let app = app().await;

    let (status, _) = send(&app, Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/borrow-requests/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_and_user_administration() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;
    let alice = register(&app, "alice").await;

    let (status, me) = send(&app, Method::GET, "/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["position"], "Employee");
    let alice_id = me["id"].as_i64().unwrap();

    let (status, _) = send(&app, Method::GET, "/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, users) = send(&app, Method::GET, "/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::DELETE, &format!("/users/{}", alice_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The token outlives the account but no longer authenticates
    let (status, _) = send(&app, Method::GET, "/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_serial_is_a_conflict() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;
    create_equipment(&app, &admin, "PRJ-1", 1).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/equipment",
        Some(&admin),
        Some(json!({
            "name": "Other",
            "full_name": "Other",
            "serial_number": "PRJ-1",
            "quantity": 1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn test_adjust_stock_validation() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;
    let id = create_equipment(&app, &admin, "PRJ-1", 2).await;
    let uri = format!("/equipment/{}/adjust-stock", id);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "adjustment": "lots" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "adjustment": -3 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidState");

    let (status, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "adjustment": 4 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 6);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "adjustment": i32::MAX }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, _) = send(&app, Method::PATCH, "/equipment/999/adjust-stock", Some(&admin), Some(json!({ "adjustment": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_path_and_query_are_bad_values() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;

    let (status, body) = send(&app, Method::GET, "/equipment/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(body["code"], 7);

    let (status, body) = send(&app, Method::PATCH, "/borrow-requests/x/approve", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send(&app, Method::GET, "/overdue?as_of=yesterday", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send(&app, Method::GET, "/equipment?status=lost", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_borrow_approve_remind_return_flow() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let equipment_id = create_equipment(&app, &admin, "PRJ-1", 5).await;

    // Too many units are refused up front
    let (status, body) = send(&app, Method::POST, "/borrow-requests", Some(&alice), Some(borrow(equipment_id, 6))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InsufficientStock");

    let (status, request) = send(&app, Method::POST, "/borrow-requests", Some(&alice), Some(borrow(equipment_id, 3))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    let request_id = request["id"].as_i64().unwrap();

    // Only the requester and admins can see it
    let (status, _) = send(&app, Method::GET, &format!("/borrow-requests/{}", request_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::GET, &format!("/borrow-requests/{}", request_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    // Requesters cannot decide their own requests
    let approve = format!("/borrow-requests/{}/approve", request_id);
    let (status, _) = send(&app, Method::PATCH, &approve, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = send(&app, Method::PATCH, &approve, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["request"]["status"], "approved");
    assert!(outcome["request"]["approved_at"].is_string());
    assert_eq!(outcome["equipment"]["quantity"], 2);

    let (status, body) = send(&app, Method::PATCH, &format!("/borrow-requests/{}/reject", request_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot reject an approved request");

    let (_, mine) = send(&app, Method::GET, "/borrow-requests/me", Some(&alice), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = send(&app, Method::GET, "/borrow-requests/me", Some(&bob), None).await;
    assert!(theirs.as_array().unwrap().is_empty());

    // Overdue as of a far future instant
    let (status, overdue) = send(&app, Method::GET, "/overdue?as_of=2100-01-01T00:00:00Z", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overdue.as_array().unwrap().len(), 1);
    let (_, overdue_now) = send(&app, Method::GET, "/overdue", Some(&admin), None).await;
    assert!(overdue_now.as_array().unwrap().is_empty());

    let (status, reminder) = send(&app, Method::POST, &format!("/reminders/send/{}", request_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(reminder["message"].as_str().unwrap().contains("\"Projector\" (serial PRJ-1)"));
    let reminder_id = reminder["id"].as_i64().unwrap();

    let (_, unseen) = send(&app, Method::GET, "/reminders/me", Some(&alice), None).await;
    assert_eq!(unseen.as_array().unwrap().len(), 1);

    let seen_uri = format!("/reminders/{}/seen", reminder_id);
    let (status, _) = send(&app, Method::PATCH, &seen_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, seen) = send(&app, Method::PATCH, &seen_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["seen"], true);
    let (_, unseen) = send(&app, Method::GET, "/reminders/me", Some(&alice), None).await;
    assert!(unseen.as_array().unwrap().is_empty());

    let return_uri = format!("/borrow-requests/{}/return", request_id);
    let (status, movement) = send(&app, Method::POST, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(movement["equipment"]["quantity"], 5);
    assert!(movement["request"]["returned_at"].is_string());

    let (status, _) = send(&app, Method::POST, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, overdue) = send(&app, Method::GET, "/overdue?as_of=2100-01-01T00:00:00Z", Some(&admin), None).await;
    assert!(overdue.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reject_then_decide_again() {
    let app = app().await;
    let admin = login(&app, "admin", ADMIN_PASSWORD).await;
    let alice = register(&app, "alice").await;
    let equipment_id = create_equipment(&app, &admin, "PRJ-1", 5).await;

    let (_, request) = send(&app, Method::POST, "/borrow-requests", Some(&alice), Some(borrow(equipment_id, 1))).await;
    let request_id = request["id"].as_i64().unwrap();
    let reject = format!("/borrow-requests/{}/reject", request_id);

    let (status, outcome) = send(&app, Method::PATCH, &reject, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["request"]["status"], "rejected");
    assert!(outcome.get("equipment").is_none());

    let (status, body) = send(&app, Method::PATCH, &reject, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Request is already rejected");

    let (status, body) = send(&app, Method::PATCH, &format!("/borrow-requests/{}/approve", request_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot approve a rejected request");

    let (_, equipment) = send(&app, Method::GET, &format!("/equipment/{}", equipment_id), None, None).await;
    assert_eq!(equipment["quantity"], 5);
}
