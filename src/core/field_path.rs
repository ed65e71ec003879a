//! Path expressions into recorded step responses.
//!
//! Supported forms:
//! - `data.items[0].id`, `data.items.0.id` (optional leading `response.` or `body.`)
//! - `$.data.items[0].id` JSONPath, first match wins
//! - `headers.Content-Type` response header, case-insensitive
//! - `status_code`

use jsonpath_lib::select;
use serde_json::Value;

use crate::models::result::StepResult;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_segments(path: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(format!("empty segment in path '{}'", path));
        }
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            match name.parse::<usize>() {
                Ok(index) => segments.push(Segment::Index(index)),
                Err(_) => segments.push(Segment::Key(name.to_string())),
            }
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in path '{}'", path))?;
            let index = rest[1..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid index '{}' in path '{}'", &rest[1..close], path))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected '{}' in path '{}'", rest, path));
            }
        }
    }
    Ok(segments)
}

/// Walks a dot/bracket path through a JSON value.
pub fn resolve_path(value: &Value, path: &str) -> Result<Value, String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Ok(value.clone());
    }
    if trimmed.starts_with('$') {
        return resolve_jsonpath(value, trimmed);
    }
    let mut current = value;
    let mut walked = String::new();
    for segment in parse_segments(trimmed)? {
        let label = match &segment {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => format!("[{}]", i),
        };
        current = match (&segment, current) {
            (_, Value::Null) if !walked.is_empty() => {
                return Err(format!("cannot traverse null at '{}'", walked));
            }
            (Segment::Key(key), Value::Object(map)) => map
                .get(key)
                .ok_or_else(|| format!("field '{}' not found", join_label(&walked, &label)))?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index).ok_or_else(|| {
                format!(
                    "index {} out of bounds at '{}' (len {})",
                    index,
                    join_label(&walked, &label),
                    items.len()
                )
            })?,
            (Segment::Index(index), Value::Object(map)) => map
                .get(&index.to_string())
                .ok_or_else(|| format!("field '{}' not found", join_label(&walked, &label)))?,
            (_, other) => {
                return Err(format!(
                    "cannot read '{}' from {} value",
                    join_label(&walked, &label),
                    type_name(other)
                ));
            }
        };
        walked = join_label(&walked, &label);
    }
    Ok(current.clone())
}

fn resolve_jsonpath(value: &Value, path: &str) -> Result<Value, String> {
    let matches = select(value, path).map_err(|e| format!("invalid JSONPath '{}': {:?}", path, e))?;
    matches
        .first()
        .map(|v| (*v).clone())
        .ok_or_else(|| format!("JSONPath '{}' matched nothing", path))
}

/// Resolves a path against everything recorded for a step.
pub fn resolve_in_result(result: &StepResult, path: &str) -> Result<Value, String> {
    let trimmed = path.trim();
    if trimmed == "status_code" {
        return result
            .status_code
            .code()
            .map(Value::from)
            .ok_or_else(|| format!("step {} produced no response", result.step_order));
    }
    if let Some(name) = trimmed
        .strip_prefix("headers.")
        .or_else(|| trimmed.strip_prefix("response_headers."))
    {
        if result.status_code.code().is_none() {
            return Err(format!("step {} produced no response", result.step_order));
        }
        return result
            .response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| Value::String(v.clone()))
            .ok_or_else(|| format!("response header '{}' not found", name));
    }
    let body = result
        .response_body()
        .ok_or_else(|| format!("step {} produced no response", result.step_order))?;
    resolve_path(body, strip_body_prefix(trimmed))
}

pub(crate) fn strip_body_prefix(path: &str) -> &str {
    for prefix in ["response.", "body."] {
        if let Some(rest) = path.strip_prefix(prefix) {
            return rest;
        }
    }
    if path == "response" || path == "body" {
        return "";
    }
    path
}

fn join_label(walked: &str, label: &str) -> String {
    if walked.is_empty() {
        label.to_string()
    } else if label.starts_with('[') {
        format!("{}{}", walked, label)
    } else {
        format!("{}.{}", walked, label)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
