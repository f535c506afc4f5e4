#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod flusher;
pub mod ingest;
pub mod origin;
pub mod server;

// --- re-exports ---

pub use buffer::{DedupStrategy, IngestBuffer};
pub use collector::Collector;
pub use config::{CollectorSettings, CollectorSettingsBuilder};
pub use error::CollectorError;
pub use event::InboundEvent;
pub use flusher::{FlushReport, Flusher, order_batch};
pub use ingest::{Ingest, Submission, spawn_flush_worker};
pub use origin::OriginPath;
