use thiserror::Error;

/// Request-level failures. These abort a run before any step is issued.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("malformed sequence: {0}")]
    MalformedSequence(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("test case not found: {0}")]
    TestCaseNotFound(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("execution already running: {0}")]
    AlreadyRunning(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Step-local failures. Recorded on the step, never raised past the runner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepFailure {
    #[error("timeout")]
    Timeout,

    #[error("network failure: {0}")]
    Network(String),

    #[error("request build failed: {0}")]
    InvalidRequest(String),
}

impl StepFailure {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StepFailure::Timeout
        } else if err.is_builder() {
            StepFailure::InvalidRequest(err.to_string())
        } else {
            StepFailure::Network(describe_reqwest_error(&err))
        }
    }
}

/// reqwest hides the root cause (refused, DNS, TLS) behind `source()`.
fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
