//! Agent error types.
//!
//! [`AgentError`] covers every failure inside one agent cycle. Some of them
//! only skip a single file or payload; the ones reported by
//! [`AgentError::aborts_delivery`] end the delivery phase of the current tick.
//! `From<AgentError> for LogshipError` lets the daemon propagate with `?`.

use logship_core::error::{ConfigError, LogshipError};

/// Agent domain error.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A setting is out of range or unusable.
    #[error("config error: {field}: {reason}")]
    Config {
        /// Setting name
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// A filename pattern failed to compile.
    #[error("invalid pattern for {field}: {source}")]
    Pattern {
        /// Setting name
        field: String,
        /// Regex compile error
        source: regex::Error,
    },

    /// The extraction tool could not be run or exited unsuccessfully.
    #[error("extraction failed for {path}: {reason}")]
    Extraction {
        /// File being extracted
        path: String,
        /// Spawn error or exit status with stderr
        reason: String,
    },

    /// The collector answered with a non-2xx status.
    #[error("delivery of {path} rejected with status {status}")]
    Rejected {
        /// Filename header value of the payload
        path: String,
        /// HTTP status code
        status: u16,
    },

    /// The request could not be sent or no response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The liveness probe gave up.
    #[error("collector at {url} unavailable after {attempts} probe attempts")]
    EndpointUnavailable {
        /// Destination URL
        url: String,
        /// Number of probes sent
        attempts: u32,
    },

    /// Shutdown was requested while waiting.
    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    /// `true` when the remaining deliveries of the tick must be abandoned.
    ///
    /// A rejected payload only affects itself; a transport failure or a
    /// cancelled probe means nothing else can be delivered this tick.
    pub fn aborts_delivery(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::EndpointUnavailable { .. } | Self::Cancelled
        )
    }
}

impl From<AgentError> for LogshipError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config { field, reason } => {
                LogshipError::Config(ConfigError::InvalidValue { field, reason })
            }
            AgentError::Pattern { field, source } => {
                LogshipError::Config(ConfigError::InvalidPattern {
                    field,
                    reason: source.to_string(),
                })
            }
            AgentError::Extraction { path, reason } => {
                LogshipError::Extraction(format!("{path}: {reason}"))
            }
            err @ (AgentError::Rejected { .. }
            | AgentError::Transport(_)
            | AgentError::EndpointUnavailable { .. }
            | AgentError::Cancelled) => LogshipError::Delivery(err.to_string()),
        }
    }
}
