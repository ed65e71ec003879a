use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::field_path::resolve_in_result;
use crate::core::template::value_to_text;
use crate::models::result::{ExtractionOutcome, StepResult};
use crate::models::step::ExtractionRule;
use crate::models::value_store::ValueStore;

/// Where an extracted value lands besides the value store.
#[derive(Debug, Clone, PartialEq)]
enum Target<'a> {
    Store,
    Header(&'a str),
    Param(Vec<&'a str>),
}

fn parse_target(to_field: &str) -> Target<'_> {
    let trimmed = to_field.trim();
    if let Some(name) = trimmed.strip_prefix("headers.") {
        return Target::Header(name);
    }
    for prefix in ["params.", "body.", "request."] {
        if let Some(path) = trimmed.strip_prefix(prefix) {
            return Target::Param(path.split('.').collect());
        }
    }
    Target::Store
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionEngine;

impl ExtractionEngine {
    pub fn new() -> Self {
        ExtractionEngine
    }

    /// Applies `rules` in order against the results recorded so far.
    /// Successful values are bound in `store`; failures are only recorded.
    pub fn extract(
        &self,
        rules: &[ExtractionRule],
        prior: &[StepResult],
        store: &mut ValueStore,
    ) -> Vec<ExtractionOutcome> {
        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            let source = prior.iter().find(|r| r.step_order == rule.from_step);

            let resolved = match source {
                None => Err(format!(
                    "step {} has no recorded response in this execution",
                    rule.from_step
                )),
                Some(result) => match resolve_in_result(result, &rule.from_field) {
                    Ok(Value::Null) => Err(format!("field '{}' resolved to null", rule.from_field)),
                    other => other,
                },
            };

            let outcome = match resolved {
                Ok(value) => {
                    debug!(
                        from_step = rule.from_step,
                        from_field = %rule.from_field,
                        to_field = %rule.to_field,
                        "extracted value"
                    );
                    bind(store, &rule.to_field, &value);
                    ExtractionOutcome {
                        from_step: rule.from_step,
                        from_field: rule.from_field.clone(),
                        to_field: rule.to_field.clone(),
                        extracted_value: Some(value),
                        success: true,
                        error_msg: None,
                    }
                }
                Err(msg) => {
                    warn!(
                        from_step = rule.from_step,
                        from_field = %rule.from_field,
                        "extraction failed: {}",
                        msg
                    );
                    ExtractionOutcome {
                        from_step: rule.from_step,
                        from_field: rule.from_field.clone(),
                        to_field: rule.to_field.clone(),
                        extracted_value: None,
                        success: false,
                        error_msg: Some(msg),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Writes successful `headers.*` and `params.*` targets into the step
    /// being prepared.
    pub fn apply_targets(
        &self,
        outcomes: &[ExtractionOutcome],
        headers: &mut BTreeMap<String, String>,
        params: &mut Map<String, Value>,
    ) {
        for outcome in outcomes.iter().filter(|o| o.success) {
            let Some(value) = outcome.extracted_value.as_ref() else {
                continue;
            };
            match parse_target(&outcome.to_field) {
                Target::Store => {}
                Target::Header(name) => {
                    headers.insert(name.to_string(), value_to_text(value));
                }
                Target::Param(path) => set_nested(params, &path, value.clone()),
            }
        }
    }
}

fn bind(store: &mut ValueStore, to_field: &str, value: &Value) {
    let name = to_field.trim();
    store.bind(name, value.clone());
    if let Some(last) = name.rsplit('.').next() {
        if last != name && !last.is_empty() {
            store.bind(last, value.clone());
        }
    }
}

fn set_nested(params: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = params;
    for key in parents {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.to_string(), value);
}
