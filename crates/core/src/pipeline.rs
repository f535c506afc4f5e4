//! Pipeline trait -- shared lifecycle for the agent and the collector.

use std::future::Future;

use serde::Serialize;

use crate::error::LogshipError;

/// Health of a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Running, but something needs attention.
    Degraded(String),
    /// Not running or unable to make progress.
    Unhealthy(String),
}

impl HealthStatus {
    /// `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// `true` for [`HealthStatus::Unhealthy`].
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// Lifecycle implemented by every long-running logship component.
///
/// `start` spawns the component's background work and returns once it is
/// running; `stop` cancels it and waits for in-flight work to finish.
pub trait Pipeline: Send {
    /// Start background processing.
    fn start(&mut self) -> impl Future<Output = Result<(), LogshipError>> + Send;

    /// Stop background processing and wait for it to wind down.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogshipError>> + Send;

    /// Report current health.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
