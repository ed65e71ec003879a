#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use stepchain_engine::models::step::{AssertionRule, ExtractionRule, HttpMethod, Step};

pub const TOKEN: &str = "tok-123";

async fn login(Json(body): Json<Value>) -> impl IntoResponse {
    if body["password"] == json!("secret") {
        (
            StatusCode::OK,
            Json(json!({"token": TOKEN, "user": {"id": 7, "name": body["username"]}})),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"})))
    }
}

async fn cart(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN || v == format!("Bearer {}", TOKEN))
        .unwrap_or(false);
    if authorized {
        (
            StatusCode::OK,
            Json(json!({"items": [{"sku": "A1", "qty": 2}], "count": 1})),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
    }
}

async fn user(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({"id": id, "name": format!("user-{}", id)}))
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::IM_A_TEAPOT);
    (code, Json(json!({"status": code.as_u16()})))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(1500)).await;
    Json(json!({"slow": true}))
}

async fn echo_query(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({"query": query}))
}

async fn echo_body(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    Json(json!({"body": body, "request_id": request_id}))
}

async fn plain() -> &'static str {
    "pong"
}

/// Serves the mock upstream on a free port and returns its base URL.
pub async fn spawn_mock() -> String {
    let app = Router::new()
        .route("/login", post(login))
        .route("/cart", get(cart))
        .route("/users/{id}", get(user))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
        .route("/echo", get(echo_query).post(echo_body))
        .route("/ping", get(plain));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on.
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn step(order: u32, method: HttpMethod, path: &str) -> Step {
    let mut step = Step::new(order, method, path);
    step.api_name = format!("{} {}", method, path);
    step
}

pub fn with_params(mut step: Step, params: Value) -> Step {
    if let Value::Object(map) = params {
        step.params = map;
    } else {
        step.params = Map::new();
    }
    step
}

pub fn mapping(from_step: u32, from_field: &str, to_field: &str) -> ExtractionRule {
    ExtractionRule {
        from_step,
        from_field: from_field.to_string(),
        to_field: to_field.to_string(),
    }
}

pub fn field_equals(field: &str, expected: Value) -> AssertionRule {
    AssertionRule {
        kind: "field_value".to_string(),
        description: format!("{} equals {}", field, expected),
        field: Some(field.to_string()),
        operator: Some("equals".to_string()),
        expected_value: Some(expected),
        ..Default::default()
    }
}

pub fn login_step() -> Step {
    with_params(
        step(1, HttpMethod::Post, "/login"),
        json!({"username": "alice", "password": "secret"}),
    )
}

pub fn cart_step(order: u32) -> Step {
    let mut cart = step(order, HttpMethod::Get, "/cart");
    cart.param_mappings.push(mapping(1, "token", "auth_token"));
    cart.headers.insert("Authorization".to_string(), "{{auth_token}}".to_string());
    cart
}
