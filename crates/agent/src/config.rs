//! Agent runtime settings.
//!
//! [`AgentSettings`] is the agent's view of `[agent]` in `logship.toml`:
//! durations instead of seconds, the extraction command split into program
//! and arguments, and an empty exclude pattern turned into `None`.
//!
//! # Example
//!
//! ```
//! use logship_agent::AgentSettingsBuilder;
//!
//! let settings = AgentSettingsBuilder::new()
//!     .watch_dir("/var/log/pods")
//!     .destination_url("http://collector:8080/")
//!     .build()
//!     .expect("valid settings");
//! assert_eq!(settings.method, "POST");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use logship_core::config::{AgentConfig, DELIVERY_METHODS};
use regex::Regex;

use crate::error::AgentError;
use crate::shipper::ProbePolicy;

/// Settings consumed by [`Agent`](crate::Agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    /// Root of the directory walk.
    pub watch_dir: PathBuf,
    /// Basename include regex.
    pub include_pattern: String,
    /// Basename exclude regex; `None` excludes nothing.
    pub exclude_pattern: Option<String>,
    /// Directory basenames never descended into.
    pub excluded_dirs: Vec<String>,
    /// Time between tick starts.
    pub tick_interval: Duration,
    /// Collector URL used for both the probe and deliveries.
    pub destination_url: String,
    /// HTTP method used for deliveries.
    pub method: String,
    /// Extraction program.
    pub extract_program: String,
    /// Arguments placed before the cursor flag and the file path.
    pub extract_args: Vec<String>,
    /// Flag that introduces the cursor argument.
    pub cursor_flag: String,
    /// Liveness probe pacing.
    pub probe: ProbePolicy,
    /// Per-request timeout for probe and delivery.
    pub request_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_core(&AgentConfig::default())
    }
}

impl AgentSettings {
    /// Build settings from the `[agent]` config section.
    pub fn from_core(core: &AgentConfig) -> Self {
        let (extract_program, extract_args) = match core.extract_command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        let exclude_pattern = Some(core.exclude_pattern.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_owned);

        Self {
            watch_dir: PathBuf::from(&core.watch_dir),
            include_pattern: core.include_pattern.clone(),
            exclude_pattern,
            excluded_dirs: core.excluded_dirs.clone(),
            tick_interval: Duration::from_secs(core.tick_interval_secs),
            destination_url: core.destination_url.clone(),
            method: core.method.to_ascii_uppercase(),
            extract_program,
            extract_args,
            cursor_flag: core.cursor_flag.clone(),
            probe: ProbePolicy {
                delay: Duration::from_secs(core.probe_delay_secs),
                max_attempts: core.probe_max_attempts,
            },
            request_timeout: Duration::from_secs(core.request_timeout_secs),
        }
    }

    /// Check ranges and compile both filename patterns.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.watch_dir.as_os_str().is_empty() {
            return Err(config_err("watch_dir", "must not be empty"));
        }
        compile_pattern("include_pattern", &self.include_pattern)?;
        if let Some(exclude) = &self.exclude_pattern {
            compile_pattern("exclude_pattern", exclude)?;
        }
        if self.tick_interval.is_zero() {
            return Err(config_err("tick_interval", "must be greater than 0"));
        }
        if !(self.destination_url.starts_with("http://")
            || self.destination_url.starts_with("https://"))
        {
            return Err(config_err("destination_url", "must be an http(s) URL"));
        }
        if !DELIVERY_METHODS.contains(&self.method.as_str()) {
            return Err(AgentError::Config {
                field: "method".to_owned(),
                reason: format!("must be one of: {}", DELIVERY_METHODS.join(", ")),
            });
        }
        if self.extract_program.is_empty() {
            return Err(config_err("extract_command", "must name the extraction program"));
        }
        if self.cursor_flag.is_empty() {
            return Err(config_err("cursor_flag", "must not be empty"));
        }
        if self.probe.delay.is_zero() {
            return Err(config_err("probe_delay", "must be greater than 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(config_err("request_timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

pub(crate) fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, AgentError> {
    Regex::new(pattern).map_err(|source| AgentError::Pattern {
        field: field.to_owned(),
        source,
    })
}

fn config_err(field: &str, reason: &str) -> AgentError {
    AgentError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Builder for [`AgentSettings`]; `build` validates.
#[derive(Default)]
pub struct AgentSettingsBuilder {
    settings: AgentSettings,
}

impl AgentSettingsBuilder {
    /// Start from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.watch_dir = dir.into();
        self
    }

    pub fn include_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.include_pattern = pattern.into();
        self
    }

    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.exclude_pattern = Some(pattern.into());
        self
    }

    pub fn excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.settings.excluded_dirs = dirs;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.settings.tick_interval = interval;
        self
    }

    pub fn destination_url(mut self, url: impl Into<String>) -> Self {
        self.settings.destination_url = url.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.settings.method = method.into().to_ascii_uppercase();
        self
    }

    /// Extraction program followed by its fixed arguments.
    pub fn extract_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.settings.extract_program = program.into();
        self.settings.extract_args = args;
        self
    }

    pub fn cursor_flag(mut self, flag: impl Into<String>) -> Self {
        self.settings.cursor_flag = flag.into();
        self
    }

    pub fn probe(mut self, probe: ProbePolicy) -> Self {
        self.settings.probe = probe;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    /// Validate and return the settings.
    pub fn build(self) -> Result<AgentSettings, AgentError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
