#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

// --- re-exports ---

pub use config::{AgentConfig, CollectorConfig, GeneralConfig, LogshipConfig, MetricsConfig};
pub use error::{ConfigError, LogshipError, PipelineError};
pub use pipeline::{HealthStatus, Pipeline};
