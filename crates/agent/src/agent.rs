//! The agent tick loop and its [`Pipeline`] wrapper.
//!
//! One tick runs four phases in order: discovery, extraction, delivery and
//! grooming. Ticks never overlap; the loop waits for a tick to finish before
//! the next one can start, and settings reloads are applied between ticks.

use std::time::Instant;

use logship_core::config::AgentConfig;
use logship_core::error::{LogshipError, PipelineError};
use logship_core::metrics as m;
use logship_core::pipeline::{HealthStatus, Pipeline};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AgentSettings;
use crate::error::AgentError;
use crate::extractor::{Clock, CommandExtractor, ExtractionTool, PayloadGenerator, SystemClock};
use crate::groomer::groom;
use crate::shipper::Shipper;
use crate::tracker::{FileTracker, TrackedFiles};

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Candidate files found by discovery.
    pub discovered: usize,
    /// Files tracked for the first time.
    pub added: usize,
    /// Successful extractions.
    pub extracted: usize,
    /// Extractions whose output equalled the previous one.
    pub duplicates: usize,
    /// Payloads acknowledged with 2xx.
    pub delivered: usize,
    /// Payloads answered with non-2xx.
    pub rejected: usize,
    /// Payloads extracted but not sent because delivery was abandoned.
    pub undelivered: usize,
    /// Tracking entries removed by the groomer.
    pub groomed: usize,
    /// Why part of the tick was skipped, if it was.
    pub aborted: Option<String>,
}

/// File tracker, payload generator and shipper driven by a fixed interval.
pub struct Agent<T, C = SystemClock> {
    settings: AgentSettings,
    tracker: FileTracker,
    generator: PayloadGenerator<T, C>,
    shipper: Shipper,
    tracked: TrackedFiles,
}

impl<T: ExtractionTool> Agent<T, SystemClock> {
    pub fn new(settings: AgentSettings, tool: T) -> Result<Self, AgentError> {
        Self::with_clock(settings, tool, SystemClock)
    }
}

impl<T: ExtractionTool, C: Clock> Agent<T, C> {
    /// Validate `settings` and build every component.
    pub fn with_clock(settings: AgentSettings, tool: T, clock: C) -> Result<Self, AgentError> {
        settings.validate()?;
        Ok(Self {
            tracker: FileTracker::from_settings(&settings)?,
            shipper: Shipper::from_settings(&settings)?,
            generator: PayloadGenerator::with_clock(tool, clock),
            tracked: TrackedFiles::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tracked(&self) -> &TrackedFiles {
        &self.tracked
    }

    pub fn tool(&self) -> &T {
        self.generator.tool()
    }

    /// Swap in new settings, keeping every tracked file and its cursor.
    ///
    /// Nothing changes when the new settings are invalid.
    pub fn apply_settings(&mut self, settings: AgentSettings) -> Result<(), AgentError> {
        settings.validate()?;
        let tracker = FileTracker::from_settings(&settings)?;
        let shipper = Shipper::from_settings(&settings)?;

        self.generator.tool_mut().apply_settings(&settings);
        self.tracker = tracker;
        self.shipper = shipper;
        self.settings = settings;
        info!(watch_dir = %self.settings.watch_dir.display(), "agent settings applied");
        Ok(())
    }

    /// Run one discovery, extraction, delivery and grooming pass.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        // discovery
        let tracker = self.tracker.clone();
        match tokio::task::spawn_blocking(move || tracker.discover()).await {
            Ok(candidates) => {
                report.discovered = candidates.len();
                report.added = self.tracked.reconcile(candidates);
            }
            Err(e) => {
                error!(error = %e, "discovery task failed");
                report.aborted = Some(format!("discovery task failed: {e}"));
                return report;
            }
        }

        // extraction
        let mut outbox = Vec::new();
        for file in self.tracked.iter_mut() {
            match self.generator.extract(file).await {
                Ok(extraction) => {
                    report.extracted += 1;
                    if extraction.duplicate {
                        report.duplicates += 1;
                        metrics::counter!(m::AGENT_DUPLICATES_SUPPRESSED_TOTAL).increment(1);
                    }
                    if extraction.is_deliverable() {
                        outbox.push(extraction.payload);
                    }
                }
                Err(e) => {
                    error!(error = %e, "extraction failed, skipping remaining files this tick");
                    report.aborted = Some(e.to_string());
                    break;
                }
            }
        }

        // delivery
        if !outbox.is_empty() {
            match self.shipper.probe(cancel).await {
                Ok(_) => {
                    for (sent, payload) in outbox.iter().enumerate() {
                        let filename = self.tracker.relative_name(&payload.source_path);
                        match self.shipper.deliver(payload, &filename).await {
                            Ok(()) => report.delivered += 1,
                            Err(e) if e.aborts_delivery() => {
                                error!(filename = %filename, error = %e, "delivery failed, abandoning remaining payloads");
                                report.undelivered = outbox.len() - sent;
                                report.aborted = Some(e.to_string());
                                break;
                            }
                            Err(e) => {
                                warn!(filename = %filename, error = %e, "payload rejected");
                                report.rejected += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.shipper.endpoint(), error = %e, pending = outbox.len(), "collector unavailable, payloads dropped");
                    report.undelivered = outbox.len();
                    report.aborted = Some(e.to_string());
                }
            }
        }

        // grooming
        report.groomed = groom(&mut self.tracked).await.len();

        metrics::gauge!(m::AGENT_FILES_TRACKED).set(self.tracked.len() as f64);
        metrics::histogram!(m::AGENT_TICK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        info!(
            tracked = self.tracked.len(),
            added = report.added,
            extracted = report.extracted,
            duplicates = report.duplicates,
            delivered = report.delivered,
            rejected = report.rejected,
            groomed = report.groomed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tick finished"
        );
        report
    }

    /// Tick every `tick_interval` until `cancel` fires, then hand the agent back.
    ///
    /// Settings arriving on `reload` are applied before the next tick. Each
    /// tick's report is published on `reports` when given.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        mut reload: Option<watch::Receiver<AgentSettings>>,
        reports: Option<watch::Sender<TickReport>>,
    ) -> Self {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut new_period: Option<Duration> = None;

        info!(
            watch_dir = %self.settings.watch_dir.display(),
            interval_secs = self.settings.tick_interval.as_secs(),
            "agent loop started"
        );

        loop {
            if let Some(period) = new_period.take() {
                interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(settings) = next_settings(&mut reload) => {
                    let previous = self.settings.tick_interval;
                    match self.apply_settings(settings) {
                        Ok(()) if self.settings.tick_interval != previous => {
                            new_period = Some(self.settings.tick_interval);
                        }
                        Ok(()) => {}
                        Err(e) => warn!(error = %e, "rejected reloaded settings, keeping current ones"),
                    }
                }
                _ = interval.tick() => {
                    let report = self.tick(&cancel).await;
                    if let Some(tx) = &reports {
                        tx.send_replace(report);
                    }
                }
            }
        }

        info!("agent loop stopped");
        self
    }
}

/// Next value from the reload channel; pending forever once there is none.
async fn next_settings(
    reload: &mut Option<watch::Receiver<AgentSettings>>,
) -> Option<AgentSettings> {
    let Some(rx) = reload else {
        return std::future::pending().await;
    };
    if rx.changed().await.is_ok() {
        return Some(rx.borrow_and_update().clone());
    }
    debug!("settings channel closed");
    *reload = None;
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    Initialized,
    Running,
    Stopped,
}

/// [`Agent`] running `CommandExtractor` in a background task.
pub struct AgentPipeline {
    agent: Option<Agent<CommandExtractor>>,
    task: Option<JoinHandle<Agent<CommandExtractor>>>,
    cancel: CancellationToken,
    reload_tx: watch::Sender<AgentSettings>,
    report_tx: watch::Sender<TickReport>,
    state: AgentState,
}

impl AgentPipeline {
    pub fn new(settings: AgentSettings) -> Result<Self, AgentError> {
        let tool = CommandExtractor::from_settings(&settings);
        let agent = Agent::new(settings.clone(), tool)?;
        let (reload_tx, _) = watch::channel(settings);
        let (report_tx, _) = watch::channel(TickReport::default());

        Ok(Self {
            agent: Some(agent),
            task: None,
            cancel: CancellationToken::new(),
            reload_tx,
            report_tx,
            state: AgentState::Initialized,
        })
    }

    pub fn from_core(core: &AgentConfig) -> Result<Self, AgentError> {
        Self::new(AgentSettings::from_core(core))
    }

    /// Replace the settings; a running loop picks them up before its next tick.
    pub fn reload(&mut self, settings: AgentSettings) -> Result<(), AgentError> {
        settings.validate()?;
        if let Some(agent) = self.agent.as_mut() {
            agent.apply_settings(settings.clone())?;
        }
        self.reload_tx.send_replace(settings);
        Ok(())
    }

    /// Report of the most recent tick.
    pub fn last_report(&self) -> TickReport {
        self.report_tx.borrow().clone()
    }

    /// Watch every tick report.
    pub fn subscribe_reports(&self) -> watch::Receiver<TickReport> {
        self.report_tx.subscribe()
    }
}

impl Pipeline for AgentPipeline {
    async fn start(&mut self) -> Result<(), LogshipError> {
        if self.state == AgentState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let agent = self.agent.take().ok_or_else(|| {
            PipelineError::InitFailed("agent lost by a previous failed stop".to_owned())
        })?;

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let reload = self.reload_tx.subscribe();
        let reports = self.report_tx.clone();
        self.task = Some(tokio::spawn(agent.run(cancel, Some(reload), Some(reports))));

        self.state = AgentState::Running;
        info!("agent started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogshipError> {
        if self.state != AgentState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        info!("stopping agent");

        self.cancel.cancel();
        self.state = AgentState::Stopped;
        if let Some(task) = self.task.take() {
            let agent = task
                .await
                .map_err(|e| PipelineError::TaskFailed(e.to_string()))?;
            self.agent = Some(agent);
        }

        info!("agent stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            AgentState::Running => {
                if self.task.as_ref().is_some_and(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("agent loop exited".to_owned());
                }
                let aborted = self.report_tx.borrow().aborted.clone();
                match aborted {
                    Some(reason) => HealthStatus::Degraded(reason),
                    None => HealthStatus::Healthy,
                }
            }
            AgentState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            AgentState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSettingsBuilder;
    use crate::shipper::ProbePolicy;

    fn settings(watch_dir: &std::path::Path) -> AgentSettings {
        AgentSettingsBuilder::new()
            .watch_dir(watch_dir)
            .destination_url("http://127.0.0.1:1/")
            .extract_command("true", Vec::new())
            .probe(ProbePolicy {
                delay: Duration::from_millis(10),
                max_attempts: 1,
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn pipeline_start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = AgentPipeline::new(settings(dir.path())).unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());
        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        // restartable after stop
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = AgentPipeline::new(settings(dir.path())).unwrap();
        let err = pipeline.stop().await.unwrap_err();
        assert!(matches!(err, LogshipError::Pipeline(PipelineError::NotRunning)));
    }

    #[tokio::test]
    async fn invalid_reload_is_rejected_and_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = AgentPipeline::new(settings(dir.path())).unwrap();

        let mut bad = settings(dir.path());
        bad.include_pattern = "(".to_owned();
        assert!(pipeline.reload(bad).is_err());

        let agent = pipeline.agent.as_ref().unwrap();
        assert_eq!(agent.settings().include_pattern, r"\.bin\.log$");
    }

    #[tokio::test]
    async fn reload_while_stopped_applies_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = AgentPipeline::new(settings(dir.path())).unwrap();

        let mut next = settings(dir.path());
        next.excluded_dirs = vec!["archive".to_owned()];
        pipeline.reload(next).unwrap();

        let agent = pipeline.agent.as_ref().unwrap();
        assert_eq!(agent.settings().excluded_dirs, vec!["archive"]);
    }

    #[tokio::test]
    async fn tick_on_empty_directory_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let mut agent = Agent::new(s.clone(), CommandExtractor::from_settings(&s)).unwrap();

        let report = agent.tick(&CancellationToken::new()).await;
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn new_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.tick_interval = Duration::ZERO;
        assert!(Agent::new(s.clone(), CommandExtractor::from_settings(&s)).is_err());
    }
}
