//! The collector [`Pipeline`]: listener, ingest buffer and flush worker.

use std::net::SocketAddr;
use std::sync::Arc;

use logship_core::config::CollectorConfig;
use logship_core::error::{LogshipError, PipelineError};
use logship_core::pipeline::{HealthStatus, Pipeline};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::buffer::IngestBuffer;
use crate::config::CollectorSettings;
use crate::error::CollectorError;
use crate::flusher::{FlushReport, Flusher};
use crate::ingest::{Ingest, spawn_flush_worker};
use crate::server::{ServerState, serve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectorState {
    Initialized,
    Running,
    Stopped,
}

/// HTTP receiver writing per-origin files.
pub struct Collector {
    settings: CollectorSettings,
    state: CollectorState,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    ingest: Option<Ingest>,
    server: Option<JoinHandle<Result<(), CollectorError>>>,
    worker: Option<JoinHandle<FlushReport>>,
}

impl Collector {
    pub fn new(settings: CollectorSettings) -> Result<Self, CollectorError> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: CollectorState::Initialized,
            cancel: CancellationToken::new(),
            local_addr: None,
            ingest: None,
            server: None,
            worker: None,
        })
    }

    pub fn from_core(core: &CollectorConfig) -> Result<Self, CollectorError> {
        Self::new(CollectorSettings::from_core(core))
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Bound address while running; useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Events currently buffered, `0` when not running.
    pub fn buffered(&self) -> usize {
        self.ingest.as_ref().map_or(0, Ingest::buffered)
    }
}

impl Pipeline for Collector {
    async fn start(&mut self) -> Result<(), LogshipError> {
        if self.state == CollectorState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let addr = self.settings.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CollectorError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let flusher = Flusher::new(&self.settings.output_dir, &self.settings.origin_marker);
        let worker = spawn_flush_worker(flusher, batch_rx);
        let ingest = Ingest::new(
            IngestBuffer::new(self.settings.dedup),
            self.settings.flush_threshold,
            batch_tx,
        );

        let state = Arc::new(ServerState {
            ingest: ingest.clone(),
            max_body_bytes: self.settings.max_body_bytes,
            origin_marker: self.settings.origin_marker.clone(),
        });
        self.cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, state, self.cancel.clone()));

        self.local_addr = Some(local_addr);
        self.ingest = Some(ingest);
        self.server = Some(server);
        self.worker = Some(worker);
        self.state = CollectorState::Running;

        info!(
            addr = %local_addr,
            output_dir = %self.settings.output_dir.display(),
            flush_threshold = self.settings.flush_threshold,
            dedup = %self.settings.dedup,
            "collector started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogshipError> {
        if self.state != CollectorState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        info!("stopping collector");

        self.cancel.cancel();
        self.state = CollectorState::Stopped;

        if let Some(server) = self.server.take() {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "listener ended with error"),
                Err(e) => error!(error = %e, "listener task failed"),
            }
        }

        if let Some(ingest) = self.ingest.take() {
            let remaining = ingest.close(self.settings.flush_on_shutdown);
            if remaining > 0 && self.settings.flush_on_shutdown {
                info!(events = remaining, "flushing remaining events");
            }
        }

        if let Some(worker) = self.worker.take() {
            let total = worker
                .await
                .map_err(|e| PipelineError::TaskFailed(e.to_string()))?;
            info!(
                written = total.written,
                failed = total.failed,
                "flush worker finished"
            );
        }

        self.local_addr = None;
        info!("collector stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            CollectorState::Running => {
                if self.server.as_ref().is_some_and(JoinHandle::is_finished) {
                    HealthStatus::Unhealthy("listener stopped".to_owned())
                } else if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
                    HealthStatus::Unhealthy("flush worker stopped".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            CollectorState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            CollectorState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
