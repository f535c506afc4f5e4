//! Metric names and descriptions.
//!
//! Every Prometheus metric emitted by logship is named here. Crates call
//! `metrics::counter!(logship_core::metrics::AGENT_PAYLOADS_DELIVERED_TOTAL)`
//! and friends with these constants.
//!
//! # Naming
//!
//! - prefix: `logship_`
//! - component: `agent_`, `collector_`, `daemon_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)

// ─── label keys ────────────────────────────────────────────────────

/// Outcome label key (success, failure).
pub const LABEL_RESULT: &str = "result";

/// Daemon role label key (agent, collector).
pub const LABEL_ROLE: &str = "role";

// ─── agent ─────────────────────────────────────────────────────────

/// Agent: files currently tracked (gauge)
pub const AGENT_FILES_TRACKED: &str = "logship_agent_files_tracked";

/// Agent: completed extraction tool runs (counter)
pub const AGENT_EXTRACTIONS_TOTAL: &str = "logship_agent_extractions_total";

/// Agent: extraction tool failures (counter)
pub const AGENT_EXTRACTION_FAILURES_TOTAL: &str = "logship_agent_extraction_failures_total";

/// Agent: payloads suppressed because they matched the previous payload (counter)
pub const AGENT_DUPLICATES_SUPPRESSED_TOTAL: &str = "logship_agent_duplicates_suppressed_total";

/// Agent: payloads acknowledged with 2xx (counter)
pub const AGENT_PAYLOADS_DELIVERED_TOTAL: &str = "logship_agent_payloads_delivered_total";

/// Agent: payloads answered with non-2xx (counter)
pub const AGENT_PAYLOADS_REJECTED_TOTAL: &str = "logship_agent_payloads_rejected_total";

/// Agent: bytes acknowledged by the collector (counter)
pub const AGENT_BYTES_DELIVERED_TOTAL: &str = "logship_agent_bytes_delivered_total";

/// Agent: liveness probe attempts (counter, label: result)
pub const AGENT_PROBE_ATTEMPTS_TOTAL: &str = "logship_agent_probe_attempts_total";

/// Agent: tracking entries dropped by the groomer (counter)
pub const AGENT_FILES_GROOMED_TOTAL: &str = "logship_agent_files_groomed_total";

/// Agent: tick duration (histogram, seconds)
pub const AGENT_TICK_DURATION_SECONDS: &str = "logship_agent_tick_duration_seconds";

// ─── collector ─────────────────────────────────────────────────────

/// Collector: events accepted into the buffer (counter)
pub const COLLECTOR_EVENTS_RECEIVED_TOTAL: &str = "logship_collector_events_received_total";

/// Collector: events rejected as duplicates at append time (counter)
pub const COLLECTOR_EVENTS_DUPLICATE_TOTAL: &str = "logship_collector_events_duplicate_total";

/// Collector: requests rejected with 4xx (counter)
pub const COLLECTOR_BAD_REQUESTS_TOTAL: &str = "logship_collector_bad_requests_total";

/// Collector: events in the ingest buffer (gauge)
pub const COLLECTOR_BUFFER_SIZE: &str = "logship_collector_buffer_size";

/// Collector: completed flushes (counter)
pub const COLLECTOR_FLUSHES_TOTAL: &str = "logship_collector_flushes_total";

/// Collector: events appended to destination files (counter)
pub const COLLECTOR_EVENTS_WRITTEN_TOTAL: &str = "logship_collector_events_written_total";

/// Collector: events dropped because their write failed (counter)
pub const COLLECTOR_WRITE_FAILURES_TOTAL: &str = "logship_collector_write_failures_total";

/// Collector: flush duration (histogram, seconds)
pub const COLLECTOR_FLUSH_DURATION_SECONDS: &str = "logship_collector_flush_duration_seconds";

// ─── daemon ────────────────────────────────────────────────────────

/// Daemon: build information (gauge, always 1, labels: version, role)
pub const DAEMON_BUILD_INFO: &str = "logship_daemon_build_info";

/// Daemon: configuration reloads applied (counter)
pub const DAEMON_CONFIG_RELOADS_TOTAL: &str = "logship_daemon_config_reloads_total";

/// Register HELP text for every metric.
///
/// Call once after the global recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Agent
    describe_gauge!(AGENT_FILES_TRACKED, "Number of files currently tracked");
    describe_counter!(
        AGENT_EXTRACTIONS_TOTAL,
        "Total number of successful extraction tool runs"
    );
    describe_counter!(
        AGENT_EXTRACTION_FAILURES_TOTAL,
        "Total number of extraction tool failures"
    );
    describe_counter!(
        AGENT_DUPLICATES_SUPPRESSED_TOTAL,
        "Total number of payloads not sent because they equal the previous payload"
    );
    describe_counter!(
        AGENT_PAYLOADS_DELIVERED_TOTAL,
        "Total number of payloads acknowledged by the collector"
    );
    describe_counter!(
        AGENT_PAYLOADS_REJECTED_TOTAL,
        "Total number of payloads answered with a non-2xx status"
    );
    describe_counter!(
        AGENT_BYTES_DELIVERED_TOTAL,
        "Total payload bytes acknowledged by the collector"
    );
    describe_counter!(
        AGENT_PROBE_ATTEMPTS_TOTAL,
        "Liveness probe attempts against the collector"
    );
    describe_counter!(
        AGENT_FILES_GROOMED_TOTAL,
        "Tracking entries dropped because their file disappeared"
    );
    describe_histogram!(AGENT_TICK_DURATION_SECONDS, "Duration of one agent tick");

    // Collector
    describe_counter!(
        COLLECTOR_EVENTS_RECEIVED_TOTAL,
        "Total number of events accepted into the ingest buffer"
    );
    describe_counter!(
        COLLECTOR_EVENTS_DUPLICATE_TOTAL,
        "Total number of events rejected as duplicates"
    );
    describe_counter!(
        COLLECTOR_BAD_REQUESTS_TOTAL,
        "Total number of requests rejected with a client error"
    );
    describe_gauge!(COLLECTOR_BUFFER_SIZE, "Events waiting in the ingest buffer");
    describe_counter!(COLLECTOR_FLUSHES_TOTAL, "Total number of buffer flushes");
    describe_counter!(
        COLLECTOR_EVENTS_WRITTEN_TOTAL,
        "Total number of events appended to destination files"
    );
    describe_counter!(
        COLLECTOR_WRITE_FAILURES_TOTAL,
        "Total number of events dropped because their write failed"
    );
    describe_histogram!(COLLECTOR_FLUSH_DURATION_SECONDS, "Duration of one flush");

    // Daemon
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
    describe_counter!(
        DAEMON_CONFIG_RELOADS_TOTAL,
        "Configuration reloads applied after SIGHUP"
    );
}
