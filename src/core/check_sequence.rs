use std::collections::HashSet;

use url::Url;

use crate::core::error::ExecutionError;
use crate::models::step::Step;

/// Fail-fast validation run before any HTTP call is issued.
/// A lone step may map from orders outside the request so stored
/// sequences can be re-run one step at a time.
pub(crate) fn check_sequence(steps: &[Step]) -> Result<(), ExecutionError> {
    let submitted: HashSet<u32> = steps.iter().map(|s| s.step_order).collect();
    let mut orders = HashSet::new();
    let mut previous: Option<u32> = None;
    for step in steps {
        if !orders.insert(step.step_order) {
            return Err(ExecutionError::MalformedSequence(format!(
                "duplicate step_order {}",
                step.step_order
            )));
        }
        if let Some(prev) = previous {
            if step.step_order < prev {
                return Err(ExecutionError::MalformedSequence(format!(
                    "step_order {} listed after {}",
                    step.step_order, prev
                )));
            }
            if step.step_order != prev + 1 {
                return Err(ExecutionError::MalformedSequence(format!(
                    "gap in step_order between {} and {}",
                    prev, step.step_order
                )));
            }
        }
        previous = Some(step.step_order);

        for rule in &step.param_mappings {
            if rule.from_step >= step.step_order {
                return Err(ExecutionError::MalformedSequence(format!(
                    "step {} maps from step {}; only earlier steps may be referenced",
                    step.step_order, rule.from_step
                )));
            }
            if steps.len() > 1 && !submitted.contains(&rule.from_step) {
                return Err(ExecutionError::MalformedSequence(format!(
                    "step {} maps from step {}, which is not in this sequence",
                    step.step_order, rule.from_step
                )));
            }
            if rule.from_field.trim().is_empty() || rule.to_field.trim().is_empty() {
                return Err(ExecutionError::MalformedSequence(format!(
                    "step {} has a param mapping with an empty field",
                    step.step_order
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn check_base_url(base_url: &str) -> Result<Url, ExecutionError> {
    let trimmed = base_url.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ExecutionError::InvalidRequest(format!("invalid base_url '{}': {}", trimmed, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ExecutionError::InvalidRequest(format!(
            "invalid base_url '{}': unsupported scheme {}",
            trimmed, other
        ))),
    }
}
