use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::core::batch::run_batch;
use crate::core::error::ExecutionError;
use crate::models::execution_request::{BatchPayload, ExecutionPayload, ExecutionRequest};
use crate::models::result::ExecutionReport;

/// Every error leaves the service as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            detail: detail.into(),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        ApiError::new(status_for(&err), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub(crate) fn status_for(err: &ExecutionError) -> StatusCode {
    match err {
        ExecutionError::MalformedSequence(_) | ExecutionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ExecutionError::TestCaseNotFound(_) => StatusCode::NOT_FOUND,
        ExecutionError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        ExecutionError::AlreadyRunning(_) => StatusCode::CONFLICT,
        ExecutionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ExecutionError> {
    if body.is_empty() {
        return Err(ExecutionError::InvalidRequest("request body is empty".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ExecutionError::InvalidRequest(e.to_string()))
}

/// Inline steps win over `test_case_id`.
async fn resolve_payload(state: &AppState, payload: ExecutionPayload) -> Result<ExecutionRequest, ExecutionError> {
    let test_case_id = payload.test_case_id;
    let steps = match (payload.steps, test_case_id.as_deref()) {
        (Some(steps), _) => steps,
        (None, Some(test_case_id)) => match &state.cases {
            Some(cases) => cases.load(test_case_id).await?,
            None => {
                return Err(ExecutionError::UpstreamUnavailable(
                    "no test case service configured".to_string(),
                ))
            }
        },
        (None, None) => {
            return Err(ExecutionError::InvalidRequest(
                "either steps or test_case_id is required".to_string(),
            ))
        }
    };
    Ok(ExecutionRequest {
        execution_id: payload.execution_id,
        environment: payload.environment,
        base_url: payload.base_url,
        steps,
        test_case_id,
    })
}

pub async fn execute(State(state): State<AppState>, body: Bytes) -> Result<Json<ExecutionReport>, ApiError> {
    let payload: ExecutionPayload = parse_body(&body)?;
    let mut request = resolve_payload(&state, payload).await?;
    let execution_id = request
        .execution_id
        .get_or_insert_with(|| Uuid::new_v4().to_string())
        .clone();

    let registration = state.registry.register(&execution_id)?;
    // Fires when this handler is dropped because the client went away.
    let disconnect = registration.token().clone().drop_guard();
    let runner = state.runner.clone();
    let history = state.history.clone();
    // Recorded from the task so a run whose client went away still lands in history.
    let run = tokio::spawn(async move {
        let report = runner.run_with_cancel(&request, registration.token()).await;
        if let Ok(report) = &report {
            history.record(report.clone());
        }
        drop(registration);
        report
    });
    let joined = run.await;
    let _ = disconnect.disarm();

    let report = joined.map_err(|e| ExecutionError::Internal(e.to_string()))??;
    info!(execution_id = %report.execution_id, status = %report.status, "execution served");
    Ok(Json(report))
}

pub async fn execute_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let payload: BatchPayload = parse_body(&body)?;

    let resolved = join_all(
        payload
            .requests
            .into_iter()
            .map(|item| resolve_payload(&state, item)),
    )
    .await;

    let mut slots: Vec<Option<Result<ExecutionReport, ExecutionError>>> = Vec::with_capacity(resolved.len());
    let mut runnable = Vec::new();
    let mut positions = Vec::new();
    for (index, item) in resolved.into_iter().enumerate() {
        match item {
            Ok(request) => {
                positions.push(index);
                runnable.push(request);
                slots.push(None);
            }
            Err(e) => slots.push(Some(Err(e))),
        }
    }

    let reports = run_batch(
        state.runner.clone(),
        state.registry.clone(),
        runnable,
        state.max_concurrency,
    )
    .await;
    for (index, report) in positions.into_iter().zip(reports) {
        if let Ok(report) = &report {
            state.history.record(report.clone());
        }
        slots[index] = Some(report);
    }

    let results: Vec<Value> = slots
        .into_iter()
        .map(|slot| match slot {
            Some(Ok(report)) => serde_json::to_value(report).unwrap_or_else(|e| json!({ "detail": e.to_string() })),
            Some(Err(e)) => json!({ "detail": e.to_string() }),
            None => json!({ "detail": "request was not run" }),
        })
        .collect();
    Ok(Json(json!({ "results": results })))
}

pub async fn cancel(State(state): State<AppState>, Path(execution_id): Path<String>) -> Result<Json<Value>, ApiError> {
    if state.registry.cancel(&execution_id) {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        warn!(execution_id = %execution_id, "cancel for unknown execution");
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no running execution with id {}", execution_id),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub test_case_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

const MAX_PAGE_SIZE: usize = 100;

/// `{data, total, page, page_size}`, newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    if query.page == 0 || query.page_size == 0 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "page and page_size must be at least 1",
        ));
    }
    let page_size = query.page_size.min(MAX_PAGE_SIZE);
    let test_case_id = query.test_case_id.as_deref().filter(|id| !id.is_empty());
    let (data, total) = state.history.list(test_case_id, query.page, page_size);
    Ok(Json(json!({
        "data": data,
        "total": total,
        "page": query.page,
        "page_size": page_size,
    })))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionReport>, ApiError> {
    if let Some(report) = state.history.get(&execution_id) {
        return Ok(Json(report));
    }
    let detail = if state.registry.is_running(&execution_id) {
        format!("execution {} is still running", execution_id)
    } else {
        format!("no execution with id {}", execution_id)
    };
    Err(ApiError::new(StatusCode::NOT_FOUND, detail))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not found")
}
