use thiserror::Error;

/// Public error taxonomy for the cache/evaluation layer.
#[derive(Error, Debug, Clone)]
pub enum FlagCacheError {
    #[error("invalid configuration for '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("flag '{0}' not found")]
    NotFound(String),

    #[error("circuit open after {0} consecutive failures")]
    CircuitOpen(u32),

    #[error("upstream '{endpoint}' unavailable: {cause}")]
    UpstreamUnavailable { endpoint: String, cause: String },

    #[error("evaluation of '{flag_key}' failed ({reason}): {cause}")]
    Evaluation {
        flag_key: String,
        reason: String,
        cause: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for FlagCacheError {
    fn from(error: anyhow::Error) -> Self {
        FlagCacheError::UpstreamUnavailable {
            endpoint: String::new(),
            cause: error.to_string(),
        }
    }
}

/// Errors surfaced by the upstream HTTP client (component C).
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    #[error("cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Whether this failure is worth retrying (transport or 5xx); 4xx is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Status(code) => *code >= 500,
            UpstreamError::Decode(_) | UpstreamError::Cancelled => false,
        }
    }
}
