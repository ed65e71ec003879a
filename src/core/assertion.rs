use regex::Regex;
use serde_json::{json, Value};

use crate::core::field_path::{resolve_path, strip_body_prefix};
use crate::core::step_executor::RawResponse;
use crate::core::template::value_to_text;
use crate::models::result::AssertionOutcome;
use crate::models::step::AssertionRule;

/// Normalized comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    NotContains,
    Matches,
    Exists,
    NotExists,
}

impl Operator {
    fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim().to_lowercase().as_str() {
            "==" | "=" | "eq" | "equals" | "equal" => Operator::Eq,
            "!=" | "ne" | "not_equals" | "not_equal" => Operator::Ne,
            ">" | "gt" | "greater_than" => Operator::Gt,
            "<" | "lt" | "less_than" => Operator::Lt,
            ">=" | "ge" | "gte" | "greater_than_or_equal" => Operator::Ge,
            "<=" | "le" | "lte" | "less_than_or_equal" => Operator::Le,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "matches" | "regex" => Operator::Matches,
            "exists" => Operator::Exists,
            "not_exists" => Operator::NotExists,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionEngine;

impl AssertionEngine {
    pub fn new() -> Self {
        AssertionEngine
    }

    /// The check every step gets, whatever its explicit rules say.
    pub fn status_check(&self, expected_status: u16, response: &RawResponse) -> AssertionOutcome {
        AssertionOutcome {
            kind: "status_code".to_string(),
            description: format!("status code equals {}", expected_status),
            expected: json!(expected_status),
            actual: json!(response.status),
            passed: response.status == expected_status,
            error: None,
            implicit: true,
        }
    }

    /// Evaluates every rule independently; a failure never stops the rest.
    pub fn assert(&self, rules: &[AssertionRule], response: &RawResponse) -> Vec<AssertionOutcome> {
        rules.iter().map(|rule| self.evaluate(rule, response)).collect()
    }

    fn evaluate(&self, rule: &AssertionRule, response: &RawResponse) -> AssertionOutcome {
        let kind = rule.kind.trim().to_lowercase();
        let expected = rule.expected_value.clone().unwrap_or(Value::Null);
        let mut outcome = AssertionOutcome {
            kind: rule.kind.clone(),
            description: rule.description.clone(),
            expected: expected.clone(),
            actual: Value::Null,
            passed: false,
            error: None,
            implicit: false,
        };

        let verdict = match kind.as_str() {
            "status_code" | "status" => {
                outcome.actual = json!(response.status);
                self.compare_with(rule, Operator::Eq, &outcome.actual, &expected)
            }
            "response_time" => {
                let elapsed_ms = (response.elapsed.as_secs_f64() * 1000.0).round();
                outcome.actual = json!(elapsed_ms);
                self.compare_with(rule, Operator::Lt, &outcome.actual, &expected)
            }
            "field_exists" => {
                let path = rule.field.as_deref().unwrap_or_default();
                let exists = matches!(lookup(response, path), Ok(ref v) if !v.is_null());
                outcome.actual = json!(exists);
                let wanted = expected.as_bool().unwrap_or(true);
                if rule.expected_value.is_none() {
                    outcome.expected = json!(true);
                }
                Ok(exists == wanted)
            }
            "response_contains" | "body_contains" => {
                let needle = rule
                    .text
                    .clone()
                    .unwrap_or_else(|| value_to_text(&expected));
                let haystack = value_to_text(&response.body);
                let found = haystack.contains(&needle);
                outcome.expected = json!(needle);
                outcome.actual = json!(found);
                Ok(found)
            }
            "field_value" | "response_schema" | "business_logic" | "json_path" | "header" | "" => {
                let path = rule.field.as_deref().unwrap_or_default();
                match lookup(response, path) {
                    Ok(actual) => {
                        outcome.actual = actual;
                        self.compare_with(rule, Operator::Eq, &outcome.actual, &expected)
                    }
                    Err(msg) => match rule.operator.as_deref().and_then(Operator::parse) {
                        Some(Operator::NotExists) => Ok(true),
                        Some(Operator::Exists) => Ok(false),
                        _ => Err(msg),
                    },
                }
            }
            _ => Err(format!("unsupported assertion type: {}", rule.kind)),
        };

        match verdict {
            Ok(passed) => outcome.passed = passed,
            Err(msg) => {
                outcome.passed = false;
                outcome.error = Some(msg);
            }
        }
        outcome
    }

    fn compare_with(
        &self,
        rule: &AssertionRule,
        default: Operator,
        actual: &Value,
        expected: &Value,
    ) -> Result<bool, String> {
        let operator = match rule.operator.as_deref() {
            None => default,
            Some(raw) if raw.trim().is_empty() => default,
            Some(raw) => Operator::parse(raw).ok_or_else(|| format!("unsupported operator: {}", raw))?,
        };
        compare(actual, operator, expected)
    }
}

fn lookup(response: &RawResponse, path: &str) -> Result<Value, String> {
    let trimmed = path.trim();
    if trimmed == "status_code" {
        return Ok(json!(response.status));
    }
    if let Some(name) = trimmed.strip_prefix("headers.") {
        return response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| Value::String(v.clone()))
            .ok_or_else(|| format!("response header '{}' not found", name));
    }
    resolve_path(&response.body, strip_body_prefix(trimmed))
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> Result<bool, String> {
    match operator {
        Operator::Eq => Ok(values_equal(actual, expected)),
        Operator::Ne => Ok(!values_equal(actual, expected)),
        Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
            let a = as_number(actual).ok_or_else(|| format!("actual value {} is not numeric", actual))?;
            let e = as_number(expected).ok_or_else(|| format!("expected value {} is not numeric", expected))?;
            Ok(match operator {
                Operator::Gt => a > e,
                Operator::Lt => a < e,
                Operator::Ge => a >= e,
                _ => a <= e,
            })
        }
        Operator::Contains => contains(actual, expected),
        Operator::NotContains => contains(actual, expected).map(|found| !found),
        Operator::Matches => {
            let pattern = value_to_text(expected);
            let re = Regex::new(&pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
            Ok(re.is_match(&value_to_text(actual)))
        }
        Operator::Exists => Ok(!actual.is_null()),
        Operator::NotExists => Ok(actual.is_null()),
    }
}

/// Strict JSON equality, except that numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn contains(actual: &Value, expected: &Value) -> Result<bool, String> {
    match actual {
        Value::String(s) => Ok(s.contains(&value_to_text(expected))),
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, expected))),
        Value::Object(map) => match expected {
            Value::Object(subset) => Ok(subset
                .iter()
                .all(|(k, v)| map.get(k).map(|a| values_equal(a, v)).unwrap_or(false))),
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(format!("cannot test object containment of {}", other)),
        },
        Value::Null => Ok(false),
        other => Ok(other.to_string().contains(&value_to_text(expected))),
    }
}
