//! Daemon health report.
//!
//! The daemon runs a single role, so its status is the role pipeline's
//! status. The orchestrator polls it periodically and logs transitions.

use serde::Serialize;

use logship_core::pipeline::HealthStatus;

/// Seconds between health polls in the main loop.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Health of the running daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Role name (`agent`, `collector`).
    pub role: &'static str,
    /// Status reported by the role pipeline.
    pub status: HealthStatus,
    /// Seconds since the orchestrator was built.
    pub uptime_secs: u64,
}

/// Log `current` when it differs from `previous`.
///
/// Returns `true` when a transition was logged.
pub fn log_transition(previous: &HealthStatus, current: &DaemonHealth) -> bool {
    if *previous == current.status {
        return false;
    }
    match &current.status {
        HealthStatus::Healthy => {
            tracing::info!(role = current.role, "role healthy");
        }
        HealthStatus::Degraded(reason) => {
            tracing::warn!(role = current.role, reason = %reason, "role degraded");
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(role = current.role, reason = %reason, "role unhealthy");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(status: HealthStatus) -> DaemonHealth {
        DaemonHealth {
            role: "agent",
            status,
            uptime_secs: 5,
        }
    }

    #[test]
    fn unchanged_status_is_not_logged() {
        assert!(!log_transition(
            &HealthStatus::Healthy,
            &health(HealthStatus::Healthy)
        ));
    }

    #[test]
    fn changed_reason_is_a_transition() {
        let previous = HealthStatus::Degraded("collector unavailable".to_owned());
        let current = health(HealthStatus::Degraded("extraction failed".to_owned()));
        assert!(log_transition(&previous, &current));
    }

    #[test]
    fn serializes_status_inline() {
        let json = serde_json::to_value(health(HealthStatus::Healthy)).unwrap();
        assert_eq!(json["role"], "agent");
        assert_eq!(json["status"]["status"], "healthy");
        assert_eq!(json["uptime_secs"], 5);
    }
}
