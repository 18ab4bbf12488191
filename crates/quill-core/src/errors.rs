use std::time::Duration;

/// Failures of the cognitive provider. These are infrastructure errors: they
/// escape the per-action boundary and stop the control loop.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    /// A scripted or replayed provider ran out of responses.
    #[error("provider exhausted after {0} responses")]
    Exhausted(usize),
}

impl GatewayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Exhausted(_) => "exhausted",
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::NetworkError(_)
                | Self::Timeout(_)
                | Self::ServerError { status: 500..=599, .. }
        )
    }

    /// Server-provided wait before retrying, if any.
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of a single action handler. Always recovered by the dispatcher and
/// turned into an error result for the next generation turn.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// A diff block did not match or changed nothing; the file was left untouched.
    #[error("patch not applied: {0}")]
    PatchNotApplied(String),
    #[error("{0}")]
    Store(String),
}

impl ActionError {
    pub fn missing(param: &str) -> Self {
        Self::InvalidArguments(format!("missing required attribute `{param}`"))
    }
}
