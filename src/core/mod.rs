pub mod assertion;
pub mod batch;
pub mod cancel_registry;
pub mod case_source;
pub mod check_sequence;
pub mod error;
pub mod extraction;
pub mod field_path;
pub mod history;
pub mod sequence_runner;
pub mod show_result_with_table;
pub mod step_executor;
pub mod template;
