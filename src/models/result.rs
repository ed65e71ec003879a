use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::models::step::HttpMethod;

/// HTTP status of a step, or `"Error"` when no response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Code(u16),
    Error,
}

impl StatusCode {
    pub fn code(&self) -> Option<u16> {
        match self {
            StatusCode::Code(c) => Some(*c),
            StatusCode::Error => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Code(c) => write!(f, "{}", c),
            StatusCode::Error => f.write_str("Error"),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatusCode::Code(c) => serializer.serialize_u16(*c),
            StatusCode::Error => serializer.serialize_str("Error"),
        }
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusVisitor;

        impl Visitor<'_> for StatusVisitor {
            type Value = StatusCode;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an HTTP status code or \"Error\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StatusCode, E> {
                u16::try_from(v)
                    .map(StatusCode::Code)
                    .map_err(|_| E::custom(format!("status code out of range: {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StatusCode, E> {
                u16::try_from(v)
                    .map(StatusCode::Code)
                    .map_err(|_| E::custom(format!("status code out of range: {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StatusCode, E> {
                if v == "Error" {
                    Ok(StatusCode::Error)
                } else {
                    v.parse().map(StatusCode::Code).map_err(E::custom)
                }
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

/// Outcome of one extraction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub from_step: u32,
    pub from_field: String,
    pub to_field: String,
    pub extracted_value: Option<Value>,
    pub success: bool,
    pub error_msg: Option<String>,
}

/// Outcome of one assertion. Expected and actual are always reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionOutcome {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub expected: Value,
    pub actual: Value,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_order: u32,
    pub api_name: String,
    pub method: HttpMethod,
    pub url: String,
    pub status_code: StatusCode,
    pub success: bool,
    /// Seconds.
    pub duration: f64,
    pub request_data: Map<String, Value>,
    pub request_headers: BTreeMap<String, String>,
    pub response: Option<Value>,
    pub response_headers: BTreeMap<String, String>,
    pub error: Option<String>,
    pub extractions: Vec<ExtractionOutcome>,
    pub assertions: Vec<AssertionOutcome>,
}

impl StepResult {
    /// The body recorded for this step, if a response was obtained.
    pub fn response_body(&self) -> Option<&Value> {
        match self.status_code {
            StatusCode::Code(_) => self.response.as_ref(),
            StatusCode::Error => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Error,
}

impl ExecutionStatus {
    /// Empty runs succeed; a cancelled run never reports full success.
    pub fn from_results(results: &[StepResult], cancelled: bool) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        if passed == results.len() && !cancelled {
            ExecutionStatus::Success
        } else if passed == 0 && !results.is_empty() {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Partial
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Step and assertion tallies. `success_rate` is the percentage of passed
/// assertions, 0.0 when none ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_steps: usize,
    pub success_steps: usize,
    pub failed_steps: usize,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    pub success_rate: f64,
}

impl ExecutionSummary {
    pub fn from_results(results: &[StepResult]) -> Self {
        let success_steps = results.iter().filter(|r| r.success).count();
        let total_assertions: usize = results.iter().map(|r| r.assertions.len()).sum();
        let passed_assertions = results
            .iter()
            .flat_map(|r| r.assertions.iter())
            .filter(|a| a.passed)
            .count();
        let success_rate = if total_assertions == 0 {
            0.0
        } else {
            passed_assertions as f64 / total_assertions as f64 * 100.0
        };
        ExecutionSummary {
            total_steps: results.len(),
            success_steps,
            failed_steps: results.len() - success_steps,
            total_assertions,
            passed_assertions,
            failed_assertions: total_assertions - passed_assertions,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,
    pub environment: String,
    pub status: ExecutionStatus,
    pub cancelled: bool,
    /// Seconds.
    pub duration: f64,
    /// Unix millis.
    pub started_at: u128,
    pub summary: ExecutionSummary,
    pub results: Vec<StepResult>,
}
