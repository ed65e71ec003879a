pub mod args;
pub mod execution_request;
pub mod result;
pub mod step;
pub mod value_store;
