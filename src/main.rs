use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use stepchain_engine::api::{self, AppState};
use stepchain_engine::config::Config;
use stepchain_engine::core::sequence_runner::SequenceRunner;
use stepchain_engine::core::show_result_with_table::show_result_with_table;
use stepchain_engine::core::step_executor::StepExecutor;
use stepchain_engine::logging;
use stepchain_engine::models::args::{Cli, Command};
use stepchain_engine::models::execution_request::ExecutionRequest;
use stepchain_engine::models::result::ExecutionStatus;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging.level, cli.verbose);

    match cli.command {
        Command::Serve { bind } => serve(&config, bind).await,
        Command::Run { file, base_url, json } => {
            let status = run_file(&config, &file, base_url, json).await?;
            if status != ExecutionStatus::Success {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::from_config(config)?;
    let server = api::start(state, &bind).await?;
    info!(address = %server.bound_address(), "press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    server.stop().await
}

async fn run_file(config: &Config, file: &Path, base_url: Option<String>, json: bool) -> Result<ExecutionStatus> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut request: ExecutionRequest =
        serde_json::from_str(&content).with_context(|| format!("invalid execution request in {}", file.display()))?;
    if let Some(base_url) = base_url {
        request.base_url = base_url;
    }

    let executor = StepExecutor::new(config.execution.default_timeout(), config.execution.user_agent.clone())?;
    let runner = SequenceRunner::new(executor);
    let report = runner.run(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        show_result_with_table(&report);
    }
    Ok(report.status)
}
