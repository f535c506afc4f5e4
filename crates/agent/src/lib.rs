#![doc = include_str!("../README.md")]

pub mod agent;
pub mod config;
pub mod error;
pub mod extractor;
pub mod groomer;
pub mod shipper;
pub mod tracker;

// --- re-exports ---

pub use agent::{Agent, AgentPipeline, TickReport};
pub use config::{AgentSettings, AgentSettingsBuilder};
pub use error::AgentError;
pub use extractor::{
    Clock, CommandExtractor, Extraction, ExtractionTool, Payload, PayloadGenerator, SystemClock,
};
pub use groomer::groom;
pub use shipper::{ProbePolicy, Shipper};
pub use tracker::{FileTracker, TrackedFile, TrackedFiles};
