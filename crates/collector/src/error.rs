//! Collector error types.
//!
//! Request-level variants map onto HTTP status codes in the server; the rest
//! are logged by the flush worker or returned from [`Pipeline::start`].
//!
//! [`Pipeline::start`]: logship_core::pipeline::Pipeline::start

use logship_core::error::{ConfigError, LogshipError};

/// Collector domain error.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A setting is out of range or unusable.
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    /// A required request header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// A request header is present but unusable.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    /// The request body exceeds the configured limit.
    #[error("body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The request body could not be read.
    #[error("failed to read body: {0}")]
    Body(String),

    /// An origin file name cannot be mapped under the output directory.
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// The collector is shutting down and no longer buffers events.
    #[error("collector is shutting down")]
    ShuttingDown,

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Accepting connections failed.
    #[error("listener error: {0}")]
    Listener(std::io::Error),

    /// Filesystem error during a flush.
    #[error("io error: {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl CollectorError {
    /// `true` for errors caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader(_)
                | Self::InvalidHeader { .. }
                | Self::BodyTooLarge { .. }
                | Self::Body(_)
                | Self::InvalidOrigin { .. }
        )
    }
}

impl From<CollectorError> for LogshipError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Config { field, reason } => {
                LogshipError::Config(ConfigError::InvalidValue { field, reason })
            }
            CollectorError::Io { source, .. } => LogshipError::Io(source),
            other => LogshipError::Collector(other.to_string()),
        }
    }
}
