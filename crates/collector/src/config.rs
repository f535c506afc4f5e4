//! Collector runtime settings.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use logship_core::config::CollectorConfig;

use crate::buffer::DedupStrategy;
use crate::error::CollectorError;

/// Settings consumed by [`Collector`](crate::Collector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    pub listen_addr: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub flush_threshold: usize,
    pub origin_marker: String,
    pub dedup: DedupStrategy,
    pub max_body_bytes: usize,
    pub flush_on_shutdown: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_core(&CollectorConfig::default())
    }
}

impl CollectorSettings {
    /// Build settings from the `[collector]` config section.
    ///
    /// An unknown dedup strategy falls back to the default; `validate` on the
    /// core config rejects it earlier.
    pub fn from_core(core: &CollectorConfig) -> Self {
        Self {
            listen_addr: core.listen_addr.clone(),
            port: core.port,
            output_dir: PathBuf::from(&core.output_dir),
            flush_threshold: core.flush_threshold,
            origin_marker: core.origin_marker.clone(),
            dedup: DedupStrategy::from_str_loose(&core.dedup_strategy).unwrap_or_default(),
            max_body_bytes: core.max_body_bytes,
            flush_on_shutdown: core.flush_on_shutdown,
        }
    }

    /// Address the listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, CollectorError> {
        let ip: IpAddr = self.listen_addr.parse().map_err(|e| CollectorError::Config {
            field: "listen_addr".to_owned(),
            reason: format!("'{}': {e}", self.listen_addr),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        self.socket_addr()?;
        if self.output_dir.as_os_str().is_empty() {
            return Err(config_err("output_dir", "must not be empty"));
        }
        if self.flush_threshold == 0 {
            return Err(config_err("flush_threshold", "must be greater than 0"));
        }
        if self.origin_marker.is_empty() || self.origin_marker.contains('/') {
            return Err(config_err(
                "origin_marker",
                "must be a single non-empty path segment",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(config_err("max_body_bytes", "must be greater than 0"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: &str) -> CollectorError {
    CollectorError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Builder for [`CollectorSettings`]; `build` validates.
#[derive(Default)]
pub struct CollectorSettingsBuilder {
    settings: CollectorSettings,
}

impl CollectorSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.settings.listen_addr = addr.into();
        self
    }

    /// `0` picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.output_dir = dir.into();
        self
    }

    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.settings.flush_threshold = threshold;
        self
    }

    pub fn origin_marker(mut self, marker: impl Into<String>) -> Self {
        self.settings.origin_marker = marker.into();
        self
    }

    pub fn dedup(mut self, strategy: DedupStrategy) -> Self {
        self.settings.dedup = strategy;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.settings.max_body_bytes = limit;
        self
    }

    pub fn flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.settings.flush_on_shutdown = enabled;
        self
    }

    pub fn build(self) -> Result<CollectorSettings, CollectorError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = CollectorSettings::default();
        assert_eq!(s.flush_threshold, 215);
        assert_eq!(s.output_dir, PathBuf::from("/received"));
        assert_eq!(s.dedup, DedupStrategy::KeyOrContent);
        assert!(s.flush_on_shutdown);
        assert_eq!(s.socket_addr().unwrap().to_string(), "0.0.0.0:80");
    }

    #[test]
    fn from_core_parses_strategy() {
        let core = CollectorConfig {
            dedup_strategy: "exact".to_owned(),
            ..CollectorConfig::default()
        };
        assert_eq!(CollectorSettings::from_core(&core).dedup, DedupStrategy::Exact);
    }

    #[test]
    fn ipv6_listen_addr() {
        let s = CollectorSettingsBuilder::new()
            .listen_addr("::1")
            .port(8080)
            .build()
            .unwrap();
        assert_eq!(s.socket_addr().unwrap().to_string(), "[::1]:8080");
    }

    #[test]
    fn rejects_hostname_listen_addr() {
        let err = CollectorSettingsBuilder::new()
            .listen_addr("collector.local")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = CollectorSettingsBuilder::new()
            .flush_threshold(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("flush_threshold"));
    }

    #[test]
    fn rejects_marker_with_slash() {
        let err = CollectorSettingsBuilder::new()
            .origin_marker("var/pods")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("origin_marker"));
    }
}
