pub mod api;
pub mod config;
pub mod core;
pub mod logging;
pub mod models;

pub use crate::core::assertion::AssertionEngine;
pub use crate::core::error::{ExecutionError, StepFailure};
pub use crate::core::extraction::ExtractionEngine;
pub use crate::core::sequence_runner::SequenceRunner;
pub use crate::core::step_executor::StepExecutor;
pub use crate::models::execution_request::ExecutionRequest;
pub use crate::models::result::{ExecutionReport, ExecutionStatus, ExecutionSummary, StepResult};
pub use crate::models::step::{AssertionRule, ExtractionRule, HttpMethod, Step};
