use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::cancel_registry::CancelRegistry;
use crate::core::error::ExecutionError;
use crate::core::sequence_runner::SequenceRunner;
use crate::models::execution_request::ExecutionRequest;
use crate::models::result::ExecutionReport;

/// Runs independent requests concurrently, at most `max_concurrency` at a
/// time. Each run keeps its own value store. Results come back in input
/// order, one per request.
pub async fn run_batch(
    runner: Arc<SequenceRunner>,
    registry: Arc<CancelRegistry>,
    requests: Vec<ExecutionRequest>,
    max_concurrency: usize,
) -> Vec<Result<ExecutionReport, ExecutionError>> {
    info!(requests = requests.len(), max_concurrency, "batch started");
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut handles = Vec::with_capacity(requests.len());

    for mut request in requests {
        let runner = runner.clone();
        let registry = registry.clone();
        let semaphore = semaphore.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExecutionError::Internal(e.to_string()))?;
            let execution_id = request
                .execution_id
                .get_or_insert_with(|| Uuid::new_v4().to_string())
                .clone();
            let registration = registry.register(&execution_id)?;
            runner.run_with_cancel(&request, registration.token()).await
        });
        handles.push(handle);
    }

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(e) => {
                error!("batch task failed: {}", e);
                Err(ExecutionError::Internal(e.to_string()))
            }
        })
        .collect()
}
