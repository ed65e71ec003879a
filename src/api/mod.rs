//! HTTP surface of the execution service.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::core::cancel_registry::CancelRegistry;
use crate::core::case_source::{CaseSource, HttpCaseSource};
use crate::core::history::ExecutionHistory;
use crate::core::sequence_runner::SequenceRunner;
use crate::core::step_executor::StepExecutor;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<SequenceRunner>,
    pub registry: Arc<CancelRegistry>,
    pub cases: Option<Arc<dyn CaseSource>>,
    pub history: Arc<ExecutionHistory>,
    pub max_concurrency: usize,
}

impl AppState {
    pub fn new(runner: SequenceRunner) -> Self {
        AppState {
            runner: Arc::new(runner),
            registry: Arc::new(CancelRegistry::new()),
            cases: None,
            history: Arc::new(ExecutionHistory::new(100)),
            max_concurrency: 8,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = Arc::new(ExecutionHistory::new(capacity));
        self
    }

    pub fn with_cases(mut self, cases: Arc<dyn CaseSource>) -> Self {
        self.cases = Some(cases);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let executor = StepExecutor::new(config.execution.default_timeout(), config.execution.user_agent.clone())?;
        let mut state = AppState::new(SequenceRunner::new(executor))
            .with_max_concurrency(config.execution.max_concurrency)
            .with_history_capacity(config.execution.history_capacity);
        if let Some(url) = &config.upstream.case_service_url {
            let source = HttpCaseSource::new(url.clone(), Duration::from_secs(config.upstream.timeout_secs))?;
            state = state.with_cases(Arc::new(source));
        }
        Ok(state)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/executions",
            post(handlers::execute).get(handlers::list_executions),
        )
        .route("/api/v1/executions/batch", post(handlers::execute_batch))
        .route(
            "/api/v1/executions/{execution_id}",
            get(handlers::get_execution).delete(handlers::cancel),
        )
        .fallback(handlers::not_found)
        .with_state(state)
}

/// Handle to a server started with [`start`].
#[derive(Debug)]
pub struct RunningServer {
    bind_address: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningServer {
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.handle
            .await
            .map_err(|error| anyhow!("execution server task failed: {error}"))
    }
}

/// Binds `bind_address` (port 0 picks a free one) and serves in the background.
pub async fn start(state: AppState, bind_address: &str) -> Result<RunningServer> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    let bound = listener.local_addr()?;
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn({
        let shutdown = shutdown.child_token();
        let app = router(state);
        async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                })
                .await
            {
                error!("execution server failed: {error}");
            }
        }
    });

    info!(address = %bound, "execution service listening");
    Ok(RunningServer {
        bind_address: bound,
        shutdown,
        handle,
    })
}
