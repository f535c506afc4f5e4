//! Role assembly and process lifecycle.
//!
//! The [`Orchestrator`] owns the loaded configuration and the pipeline for
//! the selected role. [`Orchestrator::run`] starts the pipeline, waits for
//! `SIGINT`/`SIGTERM` while handling `SIGHUP` reloads, then stops it.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};

use logship_agent::{AgentPipeline, AgentSettings};
use logship_collector::{Collector, CollectorSettings};
use logship_core::config::LogshipConfig;
use logship_core::error::LogshipError;
use logship_core::metrics as m;
use logship_core::pipeline::{HealthStatus, Pipeline};

use crate::cli::Role;
use crate::health::{DaemonHealth, HEALTH_CHECK_INTERVAL_SECS, log_transition};
use crate::metrics_server;

/// Pipeline for the role this process runs.
pub enum RolePipeline {
    Agent(AgentPipeline),
    Collector(Collector),
}

impl RolePipeline {
    /// Build the pipeline for `role` from `config`.
    pub fn build(role: Role, config: &LogshipConfig) -> Result<Self, LogshipError> {
        Ok(match role {
            Role::Agent => Self::Agent(AgentPipeline::from_core(&config.agent)?),
            Role::Collector => Self::Collector(Collector::from_core(&config.collector)?),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Agent(_) => Role::Agent,
            Self::Collector(_) => Role::Collector,
        }
    }
}

impl Pipeline for RolePipeline {
    async fn start(&mut self) -> Result<(), LogshipError> {
        match self {
            Self::Agent(agent) => agent.start().await,
            Self::Collector(collector) => collector.start().await,
        }
    }

    async fn stop(&mut self) -> Result<(), LogshipError> {
        match self {
            Self::Agent(agent) => agent.stop().await,
            Self::Collector(collector) => collector.stop().await,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self {
            Self::Agent(agent) => agent.health_check().await,
            Self::Collector(collector) => collector.health_check().await,
        }
    }
}

/// Check `config` the way the role would at startup, including
/// settings only the role crates can verify (pattern compilation,
/// listen address).
pub fn validate_role(config: &LogshipConfig, role: Role) -> Result<(), LogshipError> {
    config.validate()?;
    match role {
        Role::Agent => AgentSettings::from_core(&config.agent).validate()?,
        Role::Collector => CollectorSettings::from_core(&config.collector).validate()?,
    }
    Ok(())
}

/// The daemon's top-level coordinator.
pub struct Orchestrator {
    config: LogshipConfig,
    /// File re-read on `SIGHUP`; `None` disables reloading.
    config_path: Option<PathBuf>,
    pipeline: RolePipeline,
    start_time: Instant,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config_path", &self.config_path)
            .field("role", &self.pipeline.role())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Load `config_path` (with environment overrides) and build `role`.
    pub async fn build(config_path: &Path, role: Role) -> Result<Self> {
        let config = LogshipConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        let mut orchestrator = Self::build_from_config(config, role)?;
        orchestrator.config_path = Some(config_path.to_path_buf());
        Ok(orchestrator)
    }

    /// Build from an already-loaded configuration. Reloading stays
    /// disabled until [`Orchestrator::with_config_path`] is called.
    pub fn build_from_config(config: LogshipConfig, role: Role) -> Result<Self> {
        validate_role(&config, role)
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            metrics_server::record_build_info(role.as_str());
        }

        let pipeline = RolePipeline::build(role, &config)
            .map_err(|e| anyhow::anyhow!("failed to build {}: {}", role, e))?;
        tracing::info!(role = %role, "orchestrator initialized");

        Ok(Self {
            config,
            config_path: None,
            pipeline,
            start_time: Instant::now(),
        })
    }

    /// Re-read configuration from `path` on `SIGHUP`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &LogshipConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.pipeline.role()
    }

    pub fn pipeline(&self) -> &RolePipeline {
        &self.pipeline
    }

    /// Bound collector address while the collector role is running.
    pub fn collector_addr(&self) -> Option<SocketAddr> {
        match &self.pipeline {
            RolePipeline::Collector(collector) => collector.local_addr(),
            RolePipeline::Agent(_) => None,
        }
    }

    /// Run until `SIGINT` or `SIGTERM`.
    pub async fn run(&mut self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        let shutdown = async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "shutdown signal received");
        };
        self.run_until(shutdown).await
    }

    /// Start the role, serve `SIGHUP` reloads and periodic health checks
    /// until `shutdown` completes, then stop the role.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;

        let role = self.role();
        tracing::info!(role = %role, "starting role");
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start {}: {}", role, e))?;

        let mut health_interval =
            tokio::time::interval(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS));
        health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_status = HealthStatus::Healthy;

        tokio::pin!(shutdown);
        tracing::info!(role = %role, "entering main loop");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading configuration");
                    if let Err(e) = self.reload().await {
                        tracing::error!(error = %e, "configuration reload failed, keeping current settings");
                    }
                }
                _ = health_interval.tick() => {
                    let health = self.health().await;
                    log_transition(&last_status, &health);
                    last_status = health.status;
                }
            }
        }

        tracing::info!(role = %role, "stopping role");
        self.pipeline
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop {}: {}", role, e))?;
        tracing::info!(role = %role, "role stopped");
        Ok(())
    }

    /// Re-read the configuration file and apply it.
    ///
    /// Returns `true` when new settings were handed to the role. The agent
    /// applies `[agent]` before its next tick; the collector keeps its
    /// bound listener and only logs that a restart is needed. On error the
    /// current configuration stays in effect.
    pub async fn reload(&mut self) -> Result<bool> {
        let Some(path) = self.config_path.as_deref() else {
            tracing::warn!("no configuration file to reload");
            return Ok(false);
        };

        let config = LogshipConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        validate_role(&config, self.role())
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let applied = match &mut self.pipeline {
            RolePipeline::Agent(agent) => {
                if config.agent == self.config.agent {
                    tracing::info!("agent settings unchanged");
                    false
                } else {
                    agent.reload(AgentSettings::from_core(&config.agent))?;
                    tracing::info!(
                        watch_dir = %config.agent.watch_dir,
                        tick_interval_secs = config.agent.tick_interval_secs,
                        "agent settings reloaded"
                    );
                    true
                }
            }
            RolePipeline::Collector(_) => {
                tracing::warn!("collector settings take effect on restart only");
                false
            }
        };

        if applied {
            metrics::counter!(m::DAEMON_CONFIG_RELOADS_TOTAL).increment(1);
        }
        self.config = config;
        Ok(applied)
    }

    /// Current health of the role.
    pub async fn health(&self) -> DaemonHealth {
        DaemonHealth {
            role: self.role().as_str(),
            status: self.pipeline.health_check().await,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}
