use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::assertion::AssertionEngine;
use crate::core::check_sequence::{check_base_url, check_sequence};
use crate::core::error::ExecutionError;
use crate::core::extraction::ExtractionEngine;
use crate::core::step_executor::{ResolvedInputs, StepExecutor};
use crate::core::template::{fill_path_params, TemplateContext};
use crate::models::execution_request::ExecutionRequest;
use crate::models::result::{ExecutionReport, ExecutionStatus, ExecutionSummary, StatusCode, StepResult};
use crate::models::step::Step;
use crate::models::value_store::ValueStore;

/// Runs the steps of one request strictly in order. Every step runs even
/// when earlier ones fail; only cancellation stops the loop early.
#[derive(Debug, Clone)]
pub struct SequenceRunner {
    executor: StepExecutor,
    extraction: ExtractionEngine,
    assertion: AssertionEngine,
}

impl SequenceRunner {
    pub fn new(executor: StepExecutor) -> Self {
        SequenceRunner {
            executor,
            extraction: ExtractionEngine::new(),
            assertion: AssertionEngine::new(),
        }
    }

    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionReport, ExecutionError> {
        self.run_with_cancel(request, &CancellationToken::new()).await
    }

    /// Once `cancel` fires no further step is started; the step in flight
    /// finishes or times out normally and its result is kept.
    pub async fn run_with_cancel(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, ExecutionError> {
        check_base_url(&request.base_url)?;
        check_sequence(&request.steps)?;

        let execution_id = request
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(n) => n.as_millis(),
            Err(_) => 0,
        };
        let start = Instant::now();
        info!(
            execution_id = %execution_id,
            environment = %request.environment,
            steps = request.steps.len(),
            "execution started"
        );

        let mut store = ValueStore::new();
        let mut results: Vec<StepResult> = Vec::with_capacity(request.steps.len());
        let mut cancelled = false;
        for step in &request.steps {
            if cancel.is_cancelled() {
                cancelled = true;
                warn!(
                    execution_id = %execution_id,
                    next_step = step.step_order,
                    "execution cancelled"
                );
                break;
            }
            let result = self.run_step(step, &request.base_url, &results, &mut store).await;
            results.push(result);
        }

        let status = ExecutionStatus::from_results(&results, cancelled);
        let summary = ExecutionSummary::from_results(&results);
        info!(
            execution_id = %execution_id,
            status = %status,
            completed = results.len(),
            success_rate = summary.success_rate,
            "execution finished"
        );
        Ok(ExecutionReport {
            execution_id,
            test_case_id: request.test_case_id.clone(),
            environment: request.environment.clone(),
            status,
            cancelled,
            duration: start.elapsed().as_secs_f64(),
            started_at,
            summary,
            results,
        })
    }

    async fn run_step(
        &self,
        step: &Step,
        base_url: &str,
        prior: &[StepResult],
        store: &mut ValueStore,
    ) -> StepResult {
        let extractions = self.extraction.extract(&step.param_mappings, prior, store);

        let mut ctx = TemplateContext::new(store, prior);
        let mut params = ctx.render_map(&step.params);
        let mut headers: BTreeMap<String, String> = step
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), ctx.render_text(v)))
            .collect();
        let api_path = ctx.render_text(&step.api_path);
        if !ctx.unresolved().is_empty() {
            warn!(
                step = step.step_order,
                placeholders = ?ctx.unresolved(),
                "unresolved placeholders left in request"
            );
        }

        self.extraction.apply_targets(&extractions, &mut headers, &mut params);
        let api_path = fill_path_params(&api_path, &mut params);
        let resolved = ResolvedInputs {
            api_path,
            params,
            headers,
        };

        info!(step = step.step_order, method = %step.api_method, path = %resolved.api_path, "running step");
        let sent_at = Instant::now();
        let sent = match self.executor.build_url(base_url, &resolved.api_path) {
            Ok(url) => {
                let url_text = url.to_string();
                (url_text, self.executor.send(step, url, &resolved).await)
            }
            Err(e) => (String::new(), Err(e)),
        };

        // Covers the HTTP round trip only, for successes and failures alike.
        let duration = sent_at.elapsed().as_secs_f64();

        let (url, outcome) = sent;
        let (status_code, response, response_headers, assertions, error) = match outcome {
            Ok(raw) => {
                let mut assertions = vec![self.assertion.status_check(step.expected_status, &raw)];
                assertions.extend(self.assertion.assert(&step.assertions, &raw));
                (
                    StatusCode::Code(raw.status),
                    Some(raw.body),
                    raw.headers,
                    assertions,
                    None,
                )
            }
            Err(failure) => (
                StatusCode::Error,
                None,
                BTreeMap::new(),
                Vec::new(),
                Some(failure.to_string()),
            ),
        };
        let success = error.is_none() && assertions.iter().all(|a| a.passed);

        if success {
            info!(step = step.step_order, status = %status_code, duration, "step passed");
        } else {
            warn!(
                step = step.step_order,
                status = %status_code,
                error = error.as_deref().unwrap_or(""),
                failed_assertions = assertions.iter().filter(|a| !a.passed).count(),
                "step failed"
            );
        }

        StepResult {
            step_order: step.step_order,
            api_name: step.api_name.clone(),
            method: step.api_method,
            url,
            status_code,
            success,
            duration,
            request_data: resolved.params,
            request_headers: resolved.headers,
            response,
            response_headers,
            error,
            extractions,
            assertions,
        }
    }
}
