//! Placeholder substitution for step params, headers and paths.
//!
//! `{{name}}` reads the value store, `${stepN.path}` reads step N's recorded
//! response. A string that is exactly one placeholder takes the bound JSON
//! value as-is; otherwise values are spliced in as text. Unresolved
//! placeholders stay verbatim.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::core::field_path::resolve_in_result;
use crate::models::result::StepResult;
use crate::models::value_store::ValueStore;

lazy_static! {
    static ref STORE_PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap();
    static ref WHOLE_STORE_PLACEHOLDER: Regex =
        Regex::new(r"^\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}$").unwrap();
    static ref STEP_REFERENCE: Regex = Regex::new(r"\$\{step(\d+)\.([^}]+)\}").unwrap();
    static ref WHOLE_STEP_REFERENCE: Regex = Regex::new(r"^\$\{step(\d+)\.([^}]+)\}$").unwrap();
    static ref BRACED_PATH_PARAM: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    static ref COLON_PATH_PARAM: Regex = Regex::new(r"/:([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Read-only view over what a step may reference while it is being prepared.
pub struct TemplateContext<'a> {
    store: &'a ValueStore,
    results: &'a [StepResult],
    unresolved: Vec<String>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(store: &'a ValueStore, results: &'a [StepResult]) -> Self {
        TemplateContext {
            store,
            results,
            unresolved: Vec::new(),
        }
    }

    /// Placeholders seen so far that did not resolve.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    fn lookup_store(&self, name: &str) -> Option<Value> {
        self.store.get(name).cloned()
    }

    fn lookup_step(&self, step: &str, path: &str) -> Option<Value> {
        let order: u32 = step.parse().ok()?;
        let result = self.results.iter().find(|r| r.step_order == order)?;
        match resolve_in_result(result, path) {
            Ok(Value::Null) | Err(_) => None,
            Ok(v) => Some(v),
        }
    }

    /// Renders a string, keeping the JSON type when it is a single placeholder.
    pub fn render_str(&mut self, input: &str) -> Value {
        if let Some(caps) = WHOLE_STORE_PLACEHOLDER.captures(input) {
            if let Some(v) = self.lookup_store(&caps[1]) {
                return v;
            }
        }
        if let Some(caps) = WHOLE_STEP_REFERENCE.captures(input) {
            if let Some(v) = self.lookup_step(&caps[1], &caps[2]) {
                return v;
            }
        }
        Value::String(self.render_text(input))
    }

    /// Renders a string, splicing every resolved value in as text.
    pub fn render_text(&mut self, input: &str) -> String {
        if !input.contains("{{") && !input.contains("${") {
            return input.to_string();
        }
        let mut missing = Vec::new();
        let replaced = STORE_PLACEHOLDER.replace_all(input, |caps: &Captures| match self.lookup_store(&caps[1]) {
            Some(v) => value_to_text(&v),
            None => {
                missing.push(caps[0].to_string());
                caps[0].to_string()
            }
        });
        let replaced = STEP_REFERENCE
            .replace_all(&replaced, |caps: &Captures| match self.lookup_step(&caps[1], &caps[2]) {
                Some(v) => value_to_text(&v),
                None => {
                    missing.push(caps[0].to_string());
                    caps[0].to_string()
                }
            })
            .into_owned();
        self.unresolved.extend(missing);
        replaced
    }

    /// Renders every string nested inside `value`.
    pub fn render_value(&mut self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.render_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(map) => Value::Object(self.render_map(map)),
            other => other.clone(),
        }
    }

    pub fn render_map(&mut self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter().map(|(k, v)| (k.clone(), self.render_value(v))).collect()
    }
}

/// Strings verbatim, null as empty, anything else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fills `{name}` and `/:name` path segments from top-level params and
/// removes the consumed params.
pub fn fill_path_params(path: &str, params: &mut Map<String, Value>) -> String {
    let mut consumed = Vec::new();
    let filled = BRACED_PATH_PARAM.replace_all(path, |caps: &Captures| match params.get(&caps[1]) {
        Some(v) => {
            consumed.push(caps[1].to_string());
            value_to_text(v)
        }
        None => caps[0].to_string(),
    });
    let filled = COLON_PATH_PARAM
        .replace_all(&filled, |caps: &Captures| match params.get(&caps[1]) {
            Some(v) => {
                consumed.push(caps[1].to_string());
                format!("/{}", value_to_text(v))
            }
            None => caps[0].to_string(),
        })
        .into_owned();
    for key in consumed {
        params.remove(&key);
    }
    filled
}
