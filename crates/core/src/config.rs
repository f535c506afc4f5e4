//! Configuration -- `logship.toml` parsing and runtime settings.
//!
//! [`LogshipConfig`] holds every section. The agent reads `[agent]`, the
//! collector reads `[collector]`, the daemon reads `[general]` and `[metrics]`.
//!
//! # Precedence
//! 1. CLI flags (daemon only)
//! 2. Environment variables (`LOGSHIP_AGENT_WATCH_DIR=/data` form)
//! 3. Configuration file
//! 4. `Default` implementations
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), logship_core::error::LogshipError> {
//! use logship_core::config::LogshipConfig;
//!
//! let config = LogshipConfig::load("logship.toml").await?;
//! let config = LogshipConfig::parse("[agent]\nwatch_dir = \"/data\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogshipError};

/// Default number of buffered events that triggers a collector flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 215;

/// HTTP methods accepted for payload delivery.
pub const DELIVERY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

/// Collector dedup strategies, see `logship_collector::DedupStrategy`.
pub const DEDUP_STRATEGIES: &[&str] = &["key_or_content", "key", "exact"];

/// Top-level logship configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogshipConfig {
    /// Logging settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Sender side.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Receiver side.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogshipConfig {
    /// Load a TOML file, apply environment overrides and validate.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogshipError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogshipError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogshipError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogshipError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, LogshipError> {
        toml::from_str(toml_str).map_err(|e| {
            LogshipError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Override values from `LOGSHIP_{SECTION}_{FIELD}` environment variables.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSHIP_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSHIP_GENERAL_LOG_FORMAT");

        // Agent
        override_string(&mut self.agent.watch_dir, "LOGSHIP_AGENT_WATCH_DIR");
        override_string(
            &mut self.agent.include_pattern,
            "LOGSHIP_AGENT_INCLUDE_PATTERN",
        );
        override_string(
            &mut self.agent.exclude_pattern,
            "LOGSHIP_AGENT_EXCLUDE_PATTERN",
        );
        override_csv(&mut self.agent.excluded_dirs, "LOGSHIP_AGENT_EXCLUDED_DIRS");
        override_u64(
            &mut self.agent.tick_interval_secs,
            "LOGSHIP_AGENT_TICK_INTERVAL_SECS",
        );
        override_string(
            &mut self.agent.destination_url,
            "LOGSHIP_AGENT_DESTINATION_URL",
        );
        override_string(&mut self.agent.method, "LOGSHIP_AGENT_METHOD");
        override_words(
            &mut self.agent.extract_command,
            "LOGSHIP_AGENT_EXTRACT_COMMAND",
        );
        override_string(&mut self.agent.cursor_flag, "LOGSHIP_AGENT_CURSOR_FLAG");
        override_u64(
            &mut self.agent.probe_delay_secs,
            "LOGSHIP_AGENT_PROBE_DELAY_SECS",
        );
        override_u32(
            &mut self.agent.probe_max_attempts,
            "LOGSHIP_AGENT_PROBE_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.agent.request_timeout_secs,
            "LOGSHIP_AGENT_REQUEST_TIMEOUT_SECS",
        );

        // Collector
        override_string(
            &mut self.collector.listen_addr,
            "LOGSHIP_COLLECTOR_LISTEN_ADDR",
        );
        override_u16(&mut self.collector.port, "LOGSHIP_COLLECTOR_PORT");
        override_string(&mut self.collector.output_dir, "LOGSHIP_COLLECTOR_OUTPUT_DIR");
        override_usize(
            &mut self.collector.flush_threshold,
            "LOGSHIP_COLLECTOR_FLUSH_THRESHOLD",
        );
        override_string(
            &mut self.collector.origin_marker,
            "LOGSHIP_COLLECTOR_ORIGIN_MARKER",
        );
        override_string(
            &mut self.collector.dedup_strategy,
            "LOGSHIP_COLLECTOR_DEDUP_STRATEGY",
        );
        override_usize(
            &mut self.collector.max_body_bytes,
            "LOGSHIP_COLLECTOR_MAX_BODY_BYTES",
        );
        override_bool(
            &mut self.collector.flush_on_shutdown,
            "LOGSHIP_COLLECTOR_FLUSH_ON_SHUTDOWN",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGSHIP_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGSHIP_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGSHIP_METRICS_PORT");
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), LogshipError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.agent.validate()?;
        self.collector.validate()?;

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> LogshipError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Sender-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Root directory to walk for log files.
    pub watch_dir: String,
    /// Regex a file's basename must match to be tracked.
    pub include_pattern: String,
    /// Regex that excludes a matching basename. Empty disables exclusion.
    pub exclude_pattern: String,
    /// Directory basenames that are never descended into.
    pub excluded_dirs: Vec<String>,
    /// Seconds between ticks.
    pub tick_interval_secs: u64,
    /// Collector URL; also probed for liveness.
    pub destination_url: String,
    /// HTTP method used for delivery.
    pub method: String,
    /// Extraction tool program followed by its fixed flags.
    pub extract_command: Vec<String>,
    /// Flag that precedes the cursor argument.
    pub cursor_flag: String,
    /// Seconds between liveness probe attempts.
    pub probe_delay_secs: u64,
    /// Probe attempts before giving up on a tick. 0 retries forever.
    pub probe_max_attempts: u32,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch_dir: "/var/log/pods".to_owned(),
            include_pattern: r"\.bin\.log$".to_owned(),
            exclude_pattern: String::new(),
            excluded_dirs: Vec::new(),
            tick_interval_secs: 60,
            destination_url: "http://127.0.0.1:8080/".to_owned(),
            method: "POST".to_owned(),
            extract_command: vec!["decgrep".to_owned()],
            cursor_flag: "-s".to_owned(),
            probe_delay_secs: 2,
            probe_max_attempts: 0,
            request_timeout_secs: 10,
        }
    }
}

impl AgentConfig {
    /// Validate value ranges. Regex compilation is checked by the agent.
    pub fn validate(&self) -> Result<(), LogshipError> {
        if self.watch_dir.is_empty() {
            return Err(invalid("agent.watch_dir", "must not be empty".to_owned()));
        }
        if self.include_pattern.is_empty() {
            return Err(invalid(
                "agent.include_pattern",
                "must not be empty".to_owned(),
            ));
        }
        if self.tick_interval_secs == 0 {
            return Err(invalid(
                "agent.tick_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if !(self.destination_url.starts_with("http://")
            || self.destination_url.starts_with("https://"))
        {
            return Err(invalid(
                "agent.destination_url",
                format!("'{}' is not an http(s) URL", self.destination_url),
            ));
        }
        if !DELIVERY_METHODS.contains(&self.method.as_str()) {
            return Err(invalid(
                "agent.method",
                format!("must be one of: {}", DELIVERY_METHODS.join(", ")),
            ));
        }
        match self.extract_command.first() {
            Some(program) if !program.is_empty() => {}
            _ => {
                return Err(invalid(
                    "agent.extract_command",
                    "must name the extraction program".to_owned(),
                ));
            }
        }
        if self.cursor_flag.is_empty() {
            return Err(invalid("agent.cursor_flag", "must not be empty".to_owned()));
        }
        if self.probe_delay_secs == 0 {
            return Err(invalid(
                "agent.probe_delay_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid(
                "agent.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Receiver-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub port: u16,
    /// Root under which per-origin directories are created.
    pub output_dir: String,
    /// Buffered event count that triggers a flush.
    pub flush_threshold: usize,
    /// Path segment whose successor names the origin directory.
    pub origin_marker: String,
    /// Ingest dedup strategy (key_or_content, key, exact).
    pub dedup_strategy: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Flush whatever is buffered when the collector stops.
    pub flush_on_shutdown: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_owned(),
            port: 80,
            output_dir: "/received".to_owned(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            origin_marker: "pods".to_owned(),
            dedup_strategy: "key_or_content".to_owned(),
            max_body_bytes: 64 * 1024 * 1024, // 64MB
            flush_on_shutdown: true,
        }
    }
}

impl CollectorConfig {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), LogshipError> {
        if self.output_dir.is_empty() {
            return Err(invalid(
                "collector.output_dir",
                "must not be empty".to_owned(),
            ));
        }
        if self.flush_threshold == 0 {
            return Err(invalid(
                "collector.flush_threshold",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.origin_marker.is_empty() || self.origin_marker.contains('/') {
            return Err(invalid(
                "collector.origin_marker",
                "must be a single non-empty path segment".to_owned(),
            ));
        }
        if !DEDUP_STRATEGIES.contains(&self.dedup_strategy.as_str()) {
            return Err(invalid(
                "collector.dedup_strategy",
                format!("must be one of: {}", DEDUP_STRATEGIES.join(", ")),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(invalid(
                "collector.max_body_bytes",
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the exporter.
    pub enabled: bool,
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub port: u16,
    /// Scrape path.
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

fn override_words(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
