mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use common::*;
use stepchain_engine::api::{self, AppState, RunningServer};
use stepchain_engine::core::case_source::StaticCaseSource;
use stepchain_engine::models::step::HttpMethod;
use stepchain_engine::{SequenceRunner, StepExecutor};

async fn start_service(cases: Option<StaticCaseSource>) -> (RunningServer, String) {
    let runner = SequenceRunner::new(StepExecutor::new(Duration::from_secs(5), None).unwrap());
    let mut state = AppState::new(runner).with_max_concurrency(2);
    if let Some(cases) = cases {
        state = state.with_cases(Arc::new(cases));
    }
    let server = api::start(state, "127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", server.bound_address());
    (server, url)
}

async fn post(url: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new().post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_version() {
    let (server, url) = start_service(None).await;
    let body: Value = reqwest::get(format!("{}/health", url)).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn executes_inline_steps() {
    let mock = spawn_mock().await;
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions", url),
        json!({
            "execution_id": "exec-1",
            "environment": "staging",
            "base_url": mock,
            "steps": [
                login_step(),
                {
                    "step_order": 2,
                    "api_path": "/cart",
                    "api_method": "get",
                    "headers": {"Authorization": "Bearer {{auth_token}}"},
                    "param_mappings": [{"from_step": 1, "from_field": "response.token", "to_field": "auth_token"}],
                    "assertions": [{"type": "field_value", "field": "count", "operator": ">=", "expected": 1}]
                }
            ]
        }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["execution_id"], json!("exec-1"));
    assert_eq!(body["environment"], json!("staging"));
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][1]["status_code"], json!(200));
    assert_eq!(body["results"][1]["assertions"][0]["implicit"], json!(true));
    assert_eq!(body["summary"]["total_steps"], json!(2));
    assert_eq!(body["summary"]["success_steps"], json!(2));
    assert_eq!(body["summary"]["total_assertions"], json!(3));
    assert_eq!(body["summary"]["failed_assertions"], json!(0));
    assert_eq!(body["summary"]["success_rate"], json!(100.0));
}

#[tokio::test]
async fn empty_steps_succeed() {
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions", url),
        json!({"base_url": "http://localhost:9", "steps": []}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn failed_step_reports_error_status_code() {
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions", url),
        json!({"base_url": dead_base_url(), "steps": [{"step_order": 1, "api_path": "/ping"}]}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["results"][0]["status_code"], json!("Error"));
    assert!(body["results"][0]["error"].is_string());
}

#[tokio::test]
async fn malformed_sequence_is_400_with_detail() {
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions", url),
        json!({
            "base_url": "http://localhost:9",
            "steps": [{
                "step_order": 1,
                "api_path": "/a",
                "param_mappings": [{"from_step": 1, "from_field": "id", "to_field": "id"}]
            }]
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["detail"].as_str().unwrap().contains("malformed sequence"));
}

#[tokio::test]
async fn invalid_bodies_are_400() {
    let (_server, url) = start_service(None).await;
    let endpoint = format!("{}/api/v1/executions", url);

    let response = reqwest::Client::new()
        .post(&endpoint)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());

    let (status, body) = post(&endpoint, json!({"base_url": "http://localhost:9"})).await;
    assert_eq!(status, 400);
    assert!(body["detail"].as_str().unwrap().contains("test_case_id"));

    let (status, _) = post(&endpoint, json!({"base_url": "not a url", "steps": []})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn runs_stored_test_case() {
    let mock = spawn_mock().await;
    let cases = StaticCaseSource::new().with_case("case-1", vec![step(1, HttpMethod::Get, "/users/4")]);
    let (_server, url) = start_service(Some(cases)).await;
    let endpoint = format!("{}/api/v1/executions", url);

    let (status, body) = post(&endpoint, json!({"base_url": mock, "test_case_id": "case-1"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["response"]["id"], json!(4));

    let (status, body) = post(&endpoint, json!({"base_url": mock, "test_case_id": "case-9"})).await;
    assert_eq!(status, 404);
    assert!(body["detail"].as_str().unwrap().contains("case-9"));
}

#[tokio::test]
async fn test_case_without_case_service_is_502() {
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions", url),
        json!({"base_url": "http://localhost:9", "test_case_id": "case-1"}),
    )
    .await;
    assert_eq!(status, 502);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn batch_keeps_input_order() {
    let mock = spawn_mock().await;
    let (_server, url) = start_service(None).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions/batch", url),
        json!({"requests": [
            {"base_url": mock, "steps": [{"step_order": 1, "api_path": "/slow"}]},
            {"base_url": mock, "steps": [{"step_order": 2, "api_path": "/a"}, {"step_order": 1, "api_path": "/b"}]},
            {"base_url": mock, "steps": [{"step_order": 1, "api_path": "/users/5"}]},
            {"base_url": mock}
        ]}),
    )
    .await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["results"][0]["response"]["slow"], json!(true));
    assert!(results[1]["detail"].as_str().unwrap().contains("malformed sequence"));
    assert_eq!(results[2]["results"][0]["response"]["id"], json!(5));
    assert!(results[3]["detail"].is_string());
}

#[tokio::test]
async fn cancel_unknown_execution_is_404() {
    let (_server, url) = start_service(None).await;
    let response = reqwest::Client::new()
        .delete(format!("{}/api/v1/executions/nope", url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn cancel_stops_a_running_execution() {
    let mock = spawn_mock().await;
    let (_server, url) = start_service(None).await;
    let endpoint = format!("{}/api/v1/executions", url);
    let run = tokio::spawn(post_owned(
        endpoint,
        json!({
            "execution_id": "long-run",
            "base_url": mock,
            "steps": [
                {"step_order": 1, "api_path": "/slow"},
                {"step_order": 2, "api_path": "/ping"}
            ]
        }),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let response = reqwest::Client::new()
        .delete(format!("{}/api/v1/executions/long-run", url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"cancelled": true}));

    let (status, report) = run.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(report["cancelled"], json!(true));
    assert_eq!(report["status"], json!("partial"));
    assert_eq!(report["results"].as_array().unwrap().len(), 1);
}

async fn post_owned(url: String, body: Value) -> (u16, Value) {
    post(&url, body).await
}

#[tokio::test]
async fn unknown_route_is_404_with_detail() {
    let (_server, url) = start_service(None).await;
    let response = reqwest::get(format!("{}/api/v2/nothing", url)).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"detail": "not found"}));
}

async fn get(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn finished_execution_can_be_fetched_by_id() {
    let mock = spawn_mock().await;
    let (_server, url) = start_service(None).await;
    let (status, report) = post(
        &format!("{}/api/v1/executions", url),
        json!({"execution_id": "kept-1", "base_url": mock, "steps": [{"step_order": 1, "api_path": "/ping"}]}),
    )
    .await;
    assert_eq!(status, 200);

    let (status, fetched) = get(&format!("{}/api/v1/executions/kept-1", url)).await;
    assert_eq!(status, 200);
    assert_eq!(fetched, report);

    let (status, body) = get(&format!("{}/api/v1/executions/never-ran", url)).await;
    assert_eq!(status, 404);
    assert!(body["detail"].as_str().unwrap().contains("never-ran"));
}

#[tokio::test]
async fn history_lists_newest_first_and_filters_by_test_case() {
    let mock = spawn_mock().await;
    let cases = StaticCaseSource::new()
        .with_case("case-a", vec![step(1, HttpMethod::Get, "/users/1")])
        .with_case("case-b", vec![step(1, HttpMethod::Get, "/users/2")]);
    let (_server, url) = start_service(Some(cases)).await;
    let endpoint = format!("{}/api/v1/executions", url);
    for (id, case) in [("h1", "case-a"), ("h2", "case-b"), ("h3", "case-a")] {
        let (status, body) = post(&endpoint, json!({"execution_id": id, "base_url": mock, "test_case_id": case})).await;
        assert_eq!(status, 200);
        assert_eq!(body["test_case_id"], json!(case));
    }

    let (status, body) = get(&endpoint).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["page"], json!(1));
    assert_eq!(body["page_size"], json!(10));
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["execution_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["h3", "h2", "h1"]);

    let (_, body) = get(&format!("{}?test_case_id=case-a&page=2&page_size=1", endpoint)).await;
    assert_eq!(body["total"], json!(2));
    assert_eq!(body["page"], json!(2));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["execution_id"], json!("h1"));

    let (status, body) = get(&format!("{}?page=zero", endpoint)).await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn batch_runs_are_recorded_and_stored_cases_resolve_in_place() {
    let mock = spawn_mock().await;
    let cases = StaticCaseSource::new()
        .with_case("case-a", vec![step(1, HttpMethod::Get, "/users/1")])
        .with_case("case-b", vec![step(1, HttpMethod::Get, "/users/2")]);
    let (_server, url) = start_service(Some(cases)).await;
    let (status, body) = post(
        &format!("{}/api/v1/executions/batch", url),
        json!({"requests": [
            {"base_url": mock, "test_case_id": "case-b"},
            {"base_url": mock, "test_case_id": "case-missing"},
            {"base_url": mock, "test_case_id": "case-a"}
        ]}),
    )
    .await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["results"][0]["response"]["id"], json!(2));
    assert!(results[1]["detail"].as_str().unwrap().contains("case-missing"));
    assert_eq!(results[2]["results"][0]["response"]["id"], json!(1));

    let id = results[2]["execution_id"].as_str().unwrap();
    let (status, fetched) = get(&format!("{}/api/v1/executions/{}", url, id)).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["test_case_id"], json!("case-a"));
}
