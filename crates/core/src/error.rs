//! Error types -- workspace-wide error taxonomy.
//!
//! Each crate defines its own domain error and converts it into
//! [`LogshipError`] so the daemon can propagate everything with `?`.

/// Top-level logship error.
#[derive(Debug, thiserror::Error)]
pub enum LogshipError {
    /// Configuration error (fatal at startup).
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline lifecycle error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Extraction tool failure on the agent side.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Delivery failure on the agent side.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Collector-side ingest or write failure.
    #[error("collector error: {0}")]
    Collector(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration could not be parsed.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is out of range or otherwise unusable.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A filename pattern failed to compile.
    #[error("invalid pattern for '{field}': {reason}")]
    InvalidPattern { field: String, reason: String },
}

/// Pipeline lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `start` called on a running pipeline.
    #[error("pipeline already running")]
    AlreadyRunning,

    /// `stop` called on a pipeline that is not running.
    #[error("pipeline not running")]
    NotRunning,

    /// Pipeline could not be initialised.
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// Background task ended abnormally.
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}
