use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::core::error::ExecutionError;
use crate::models::step::Step;

/// Resolves a stored test case id to its steps.
pub trait CaseSource: Send + Sync {
    fn load<'a>(&'a self, test_case_id: &'a str) -> BoxFuture<'a, Result<Vec<Step>, ExecutionError>>;
}

/// Fetches test cases from `GET {base}/api/v1/test-cases/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCaseSource {
    client: Client,
    base_url: Url,
}

impl HttpCaseSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(base_url.trim())
            .with_context(|| format!("invalid case service url '{}'", base_url))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("case service url '{}' cannot carry a path", base_url);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build case service client")?;
        Ok(HttpCaseSource {
            client,
            base_url: parsed,
        })
    }

    /// The id always lands in a single encoded path segment.
    fn case_url(&self, test_case_id: &str) -> Result<Url, ExecutionError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ExecutionError::Internal(format!("case service url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "test-cases"])
            .push(test_case_id);
        Ok(url)
    }

    async fn fetch(&self, test_case_id: &str) -> Result<Vec<Step>, ExecutionError> {
        let url = self.case_url(test_case_id)?;
        debug!(url = %url, "loading test case");
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("case service unreachable: {}", e);
            ExecutionError::UpstreamUnavailable(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ExecutionError::TestCaseNotFound(test_case_id.to_string()));
        }
        if !status.is_success() {
            return Err(ExecutionError::UpstreamUnavailable(format!(
                "case service answered {} for test case {}",
                status, test_case_id
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::UpstreamUnavailable(format!("unreadable test case body: {}", e)))?;
        steps_from_case(body)
    }
}

impl CaseSource for HttpCaseSource {
    fn load<'a>(&'a self, test_case_id: &'a str) -> BoxFuture<'a, Result<Vec<Step>, ExecutionError>> {
        self.fetch(test_case_id).boxed()
    }
}

/// Test cases held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StaticCaseSource {
    cases: HashMap<String, Vec<Step>>,
}

impl StaticCaseSource {
    pub fn new() -> Self {
        StaticCaseSource::default()
    }

    pub fn with_case(mut self, test_case_id: impl Into<String>, steps: Vec<Step>) -> Self {
        self.cases.insert(test_case_id.into(), steps);
        self
    }
}

impl CaseSource for StaticCaseSource {
    fn load<'a>(&'a self, test_case_id: &'a str) -> BoxFuture<'a, Result<Vec<Step>, ExecutionError>> {
        let found = self
            .cases
            .get(test_case_id)
            .cloned()
            .ok_or_else(|| ExecutionError::TestCaseNotFound(test_case_id.to_string()));
        futures::future::ready(found).boxed()
    }
}

/// Accepts `{"steps": [...]}`, `{"steps": "<json>"}`, `{"data": {...}}` or a bare array.
pub(crate) fn steps_from_case(body: Value) -> Result<Vec<Step>, ExecutionError> {
    let steps = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => {
            if let Some(Value::Object(data)) = map.remove("data") {
                return steps_from_case(Value::Object(data));
            }
            match map.remove("steps") {
                Some(Value::String(raw)) => serde_json::from_str(&raw).map_err(|e| {
                    ExecutionError::MalformedSequence(format!("test case steps are not valid json: {}", e))
                })?,
                Some(steps) => steps,
                None => return Err(ExecutionError::MalformedSequence("test case has no steps".to_string())),
            }
        }
        _ => return Err(ExecutionError::MalformedSequence("unexpected test case body".to_string())),
    };
    serde_json::from_value(steps).map_err(|e| ExecutionError::MalformedSequence(format!("invalid step: {}", e)))
}
