use std::time::Duration;
use thiserror::Error;

/// Ways a Reasoner call can fail. All of them are recoverable.
#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("reasoner timed out after {0:?}")]
    Timeout(Duration),

    #[error("reasoner transport failure: {0}")]
    Transport(String),

    #[error("reasoner returned a malformed response: {0}")]
    Malformed(String),

    #[error("reasoner returned an empty response")]
    Empty,
}

impl ReasonerError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store record '{key}' is not valid JSON: {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store key '{0}'")]
    InvalidKey(String),
}
