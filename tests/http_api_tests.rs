//! HTTP-level tests driving the router over the in-memory backend

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use unigoods_server::app::{build_state, Stores};
use unigoods_server::auth::generate_token;
use unigoods_server::models::{User, UserRole};
use unigoods_server::routes::api_router;
use unigoods_server::trade::TradePolicy;
use unigoods_server::user::InMemoryUserDirectory;
use unigoods_server::websocket::WsState;

const SECRET: &str = "http-test-secret";

struct TestApp {
    router: Router,
    users: Arc<InMemoryUserDirectory>,
}

impl TestApp {
    fn new() -> Self {
        let (stores, users) = Stores::in_memory();
        let state = build_state(stores, TradePolicy::default(), SECRET, WsState::new());
        Self {
            router: api_router(state),
            users,
        }
    }

    async fn user(&self, name: &str, role: UserRole) -> (User, String) {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@state.edu", name.to_lowercase()),
            university: "State U".to_string(),
            role,
            created_at: Utc::now(),
        };
        self.users.insert(user.clone()).await;
        let token = generate_token(&user, SECRET, 3600).unwrap();
        (user, token)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
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

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn list_item(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/products",
                Some(token),
                Some(json!({
                    "title": title,
                    "description": format!("{} in good shape", title),
                    "condition": "Like New",
                    "image_url": "https://img.example/p.png",
                    "category": "books",
                    "tags": ["campus"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_on_memory_backend() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in-memory");
}

#[tokio::test]
async fn test_trade_routes_require_token() {
    let app = TestApp::new();
    let (status, body) = app
        .call(Method::GET, "/api/trades/my-trades", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");

    let (status, _) = app
        .call(Method::GET, "/api/trades/my-trades", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trade_flow_over_http() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("Alice", UserRole::User).await;
    let (bob, bob_token) = app.user("Bob", UserRole::User).await;
    let calculator = app.list_item(&alice_token, "Calculator").await;
    let textbook = app.list_item(&bob_token, "Textbook").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/trades",
            Some(&alice_token),
            Some(json!({
                "recipient_id": bob.id,
                "offered_items": [calculator],
                "requested_items": [textbook],
                "message": "swap?"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["initiator"]["id"], alice.id.to_string());
    let trade_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .call(Method::GET, &format!("/api/products/{}", calculator), None, None)
        .await;
    assert_eq!(body["data"]["is_available"], false);

    let (_, body) = app.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(body["data"]["total"], 0);

    let status_uri = format!("/api/trades/{}/status", trade_id);
    let (status, body) = app
        .call(
            Method::PATCH,
            &status_uri,
            Some(&alice_token),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = app
        .call(
            Method::PATCH,
            &status_uri,
            Some(&bob_token),
            Some(json!({ "status": "rejected" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");

    let (status, _) = app
        .call(
            Method::PATCH,
            &status_uri,
            Some(&bob_token),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(body["data"]["total"], 2);

    let (status, body) = app
        .call(Method::GET, "/api/trades/my-trades", Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_trade_validation_and_lookup_errors() {
    let app = TestApp::new();
    let (_, alice_token) = app.user("Alice", UserRole::User).await;
    let (bob, bob_token) = app.user("Bob", UserRole::User).await;
    let textbook = app.list_item(&bob_token, "Textbook").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/trades",
            Some(&alice_token),
            Some(json!({
                "recipient_id": bob.id,
                "offered_items": [],
                "requested_items": [textbook]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/trades/{}", Uuid::new_v4()),
            Some(&alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_cannot_delete_item_held_by_trade() {
    let app = TestApp::new();
    let (_, alice_token) = app.user("Alice", UserRole::User).await;
    let (bob, bob_token) = app.user("Bob", UserRole::User).await;
    let lamp = app.list_item(&alice_token, "Lamp").await;
    let poster = app.list_item(&bob_token, "Poster").await;

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/products/{}", lamp),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.call(
        Method::POST,
        "/api/trades",
        Some(&alice_token),
        Some(json!({
            "recipient_id": bob.id,
            "offered_items": [lamp],
            "requested_items": [poster]
        })),
    )
    .await;

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/products/{}", lamp),
            Some(&alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verification_admin_gate() {
    let app = TestApp::new();
    let (_, student_token) = app.user("Student", UserRole::User).await;
    let (_, admin_token) = app.user("Admin", UserRole::Admin).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/verifications",
            Some(&student_token),
            Some(json!({ "student_id_url": "https://img.example/id.png" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let verification_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(Method::GET, "/api/verifications", Some(&student_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/verifications?status=pending",
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/verifications/{}/review", verification_id),
            Some(&admin_token),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");

    let (_, body) = app
        .call(
            Method::GET,
            "/api/verifications/status",
            Some(&student_token),
            None,
        )
        .await;
    assert_eq!(body["data"]["status"], "approved");
}

#[tokio::test]
async fn test_public_user_profile_hides_email() {
    let app = TestApp::new();
    let (user, _) = app.user("Casey", UserRole::User).await;

    let (status, body) = app
        .call(Method::GET, &format!("/api/users/{}", user.id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Casey");
    assert!(body["data"].get("email").is_none());
}

#[tokio::test]
async fn test_event_feed_requires_token() {
    let app = TestApp::new();
    let (_, token) = app.user("Erin", UserRole::User).await;

    let (status, body) = app.call(Method::GET, "/ws", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.call(Method::GET, "/ws?token=forged", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A valid token gets past authentication; the plain request then fails
    // the upgrade handshake instead
    let (status, _) = app
        .call(Method::GET, &format!("/ws?token={}", token), None, None)
        .await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/ws", Some(&token), None).await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_huge_page_number_is_clamped() {
    let app = TestApp::new();
    let (_, token) = app.user("Finn", UserRole::User).await;
    app.list_item(&token, "Stapler").await;

    let uri = format!("/api/products?page={}", i64::MAX);
    let (status, body) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert!(body["data"]["data"].as_array().unwrap().is_empty());

    let uri = format!("/api/trades/my-trades?page={}&limit=100", i64::MAX);
    let (status, _) = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}
