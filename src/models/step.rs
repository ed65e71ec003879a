use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// HTTP verbs a step may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// GET and DELETE carry params in the query string, the rest in a JSON body.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Copies a value out of an earlier step's response into a named slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub from_step: u32,
    pub from_field: String,
    pub to_field: String,
}

/// A single pass/fail check against a step's response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssertionRule {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    /// Path into the response the actual value is read from.
    #[serde(default, alias = "actual", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, alias = "expected", skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
    /// Needle for `response_contains`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One configured HTTP call within a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_order: u32,
    #[serde(default)]
    pub api_id: String,
    #[serde(default)]
    pub api_name: String,
    pub api_path: String,
    #[serde(default)]
    pub api_method: HttpMethod,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub param_mappings: Vec<ExtractionRule>,
    #[serde(default)]
    pub assertions: Vec<AssertionRule>,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Seconds; falls back to the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_expected_status() -> u16 {
    200
}

impl Step {
    pub fn new(step_order: u32, api_method: HttpMethod, api_path: impl Into<String>) -> Self {
        Step {
            step_order,
            api_id: String::new(),
            api_name: String::new(),
            api_path: api_path.into(),
            api_method,
            description: String::new(),
            params: Map::new(),
            headers: BTreeMap::new(),
            param_mappings: Vec::new(),
            assertions: Vec::new(),
            expected_status: default_expected_status(),
            timeout: None,
        }
    }
}
