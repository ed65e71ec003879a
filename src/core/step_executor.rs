use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::core::error::StepFailure;
use crate::core::template::value_to_text;
use crate::models::step::{HttpMethod, Step};

/// What came back from one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when possible, raw text otherwise, `Null` when empty.
    pub body: Value,
    pub elapsed: Duration,
}

/// Step inputs after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedInputs {
    pub api_path: String,
    pub params: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
}

/// `<name> <version> (<os>; <os version>)`
pub fn default_user_agent() -> String {
    let info = os_info::get();
    format!(
        "{} {} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        info.os_type(),
        info.version()
    )
}

/// Issues one HTTP call per invocation. Holds no per-run state.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    client: Client,
    default_timeout: Duration,
}

impl StepExecutor {
    pub fn new(default_timeout: Duration, user_agent: Option<String>) -> anyhow::Result<Self> {
        let user_agent = user_agent.unwrap_or_else(default_user_agent);
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("failed to build http client")?;
        Ok(StepExecutor {
            client,
            default_timeout,
        })
    }

    /// `base_url + api_path`, with exactly one slash between them.
    pub fn build_url(&self, base_url: &str, api_path: &str) -> Result<Url, StepFailure> {
        let joined = format!(
            "{}/{}",
            base_url.trim().trim_end_matches('/'),
            api_path.trim().trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| StepFailure::InvalidRequest(format!("invalid url '{}': {}", joined, e)))
    }

    pub async fn execute(
        &self,
        step: &Step,
        resolved: &ResolvedInputs,
        base_url: &str,
    ) -> Result<RawResponse, StepFailure> {
        let url = self.build_url(base_url, &resolved.api_path)?;
        self.send(step, url, resolved).await
    }

    /// Sends the request. Network errors and timeouts come back as `StepFailure`.
    pub async fn send(&self, step: &Step, mut url: Url, resolved: &ResolvedInputs) -> Result<RawResponse, StepFailure> {
        let method = match step.api_method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Patch => Method::PATCH,
        };

        if !step.api_method.sends_body() && !resolved.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &resolved.params {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            pairs.append_pair(key, &value_to_text(item));
                        }
                    }
                    other => {
                        pairs.append_pair(key, &value_to_text(other));
                    }
                }
            }
        }

        let headers = build_headers(&resolved.headers)?;
        let mut request = self.client.request(method, url.clone()).headers(headers);
        if step.api_method.sends_body() {
            request = request.json(&Value::Object(resolved.params.clone()));
        }
        let timeout = match step.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(self.default_timeout),
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        debug!(method = %step.api_method, url = %url, "sending request");
        let start = Instant::now();
        let response = request.send().await.map_err(StepFailure::from_reqwest)?;
        let status = response.status().as_u16();
        let mut response_headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            response_headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let bytes = response.bytes().await.map_err(StepFailure::from_reqwest)?;
        let elapsed = start.elapsed();

        Ok(RawResponse {
            status,
            headers: response_headers,
            body: parse_body(&bytes),
            elapsed,
        })
    }
}

fn build_headers(input: &BTreeMap<String, String>) -> Result<HeaderMap, StepFailure> {
    let mut headers = HeaderMap::new();
    for (key, value) in input {
        if key.trim().is_empty() {
            continue;
        }
        let name = HeaderName::from_bytes(key.trim().as_bytes())
            .map_err(|e| StepFailure::InvalidRequest(format!("invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StepFailure::InvalidRequest(format!("invalid header value for '{}': {}", key, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
