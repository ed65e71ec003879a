use serde::{Deserialize, Serialize};

use crate::models::step::Step;

/// A fully resolved request: the steps are known and owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub base_url: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Set when the steps were loaded from a stored test case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(environment: impl Into<String>, base_url: impl Into<String>, steps: Vec<Step>) -> Self {
        ExecutionRequest {
            execution_id: None,
            environment: environment.into(),
            base_url: base_url.into(),
            steps,
            test_case_id: None,
        }
    }
}

/// Wire body of `POST /api/v1/executions`: either inline steps or a stored test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub base_url: String,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub test_case_id: Option<String>,
}

/// Wire body of `POST /api/v1/executions/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub requests: Vec<ExecutionPayload>,
}

fn default_environment() -> String {
    String::from("test")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_by_test_case_id() {
        let payload: ExecutionPayload = serde_json::from_value(json!({
            "test_case_id": "42",
            "base_url": "http://localhost:9000"
        }))
        .unwrap();
        assert_eq!(payload.environment, "test");
        assert_eq!(payload.test_case_id.as_deref(), Some("42"));
        assert!(payload.steps.is_none());
    }

    #[test]
    fn test_payload_with_inline_steps() {
        let payload: ExecutionPayload = serde_json::from_value(json!({
            "environment": "staging",
            "base_url": "http://localhost:9000",
            "steps": [{"step_order": 1, "api_path": "/ping", "api_method": "GET"}]
        }))
        .unwrap();
        assert_eq!(payload.steps.map(|s| s.len()), Some(1));
    }
}
