//! Delivering payloads to the collector.
//!
//! Before any delivery in a tick the shipper probes the collector with `GET`
//! on the destination URL until it answers 2xx. Each payload is then sent as
//! one request carrying the `Filename` and `Timestamp` headers.

use std::time::Duration;

use logship_core::metrics as m;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;

use crate::config::AgentSettings;
use crate::error::AgentError;
use crate::extractor::Payload;

/// Header carrying the payload's path relative to the watch directory.
pub const FILENAME_HEADER: &str = "Filename";
/// Header carrying the payload's cursor as a decimal integer.
pub const TIMESTAMP_HEADER: &str = "Timestamp";
/// Content type of every payload.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Failed probes are logged at warn level on the first attempt and then
/// every this many attempts.
const PROBE_WARN_EVERY: u32 = 30;

/// How the liveness probe is paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Wait between failed attempts.
    pub delay: Duration,
    /// Give up after this many attempts; `0` never gives up.
    pub max_attempts: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_attempts: 0,
        }
    }
}

impl ProbePolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// HTTP client for the collector.
#[derive(Debug, Clone)]
pub struct Shipper {
    client: reqwest::Client,
    endpoint: String,
    method: Method,
    probe: ProbePolicy,
}

impl Shipper {
    pub fn new(
        endpoint: impl Into<String>,
        method: &str,
        probe: ProbePolicy,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| AgentError::Config {
            field: "method".to_owned(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            method,
            probe,
        })
    }

    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AgentError> {
        Self::new(
            settings.destination_url.clone(),
            &settings.method,
            settings.probe,
            settings.request_timeout,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Wait until the collector answers `GET` with 2xx.
    ///
    /// Returns the number of attempts made. Fails with
    /// [`AgentError::EndpointUnavailable`] when the attempt cap is reached and
    /// with [`AgentError::Cancelled`] when `cancel` fires while waiting.
    pub async fn probe(&self, cancel: &CancellationToken) -> Result<u32, AgentError> {
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);

            let failure = match self.client.get(&self.endpoint).send().await {
                Ok(resp) if resp.status().is_success() => {
                    metrics::counter!(m::AGENT_PROBE_ATTEMPTS_TOTAL, m::LABEL_RESULT => "success")
                        .increment(1);
                    if attempts > 1 {
                        tracing::info!(endpoint = %self.endpoint, attempts, "collector is reachable again");
                    }
                    return Ok(attempts);
                }
                Ok(resp) => format!("status {}", resp.status()),
                Err(e) => e.to_string(),
            };
            metrics::counter!(m::AGENT_PROBE_ATTEMPTS_TOTAL, m::LABEL_RESULT => "failure")
                .increment(1);

            if self.probe.exhausted(attempts) {
                return Err(AgentError::EndpointUnavailable {
                    url: self.endpoint.clone(),
                    attempts,
                });
            }

            if attempts == 1 || attempts % PROBE_WARN_EVERY == 0 {
                tracing::warn!(endpoint = %self.endpoint, attempts, error = %failure, "collector not ready, retrying");
            } else {
                tracing::debug!(endpoint = %self.endpoint, attempts, error = %failure, "collector not ready");
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(self.probe.delay) => {}
            }
        }
    }

    /// Send one payload. `filename` becomes the `Filename` header.
    ///
    /// A non-2xx answer is [`AgentError::Rejected`]; failing to get any
    /// answer is [`AgentError::Transport`].
    pub async fn deliver(&self, payload: &Payload, filename: &str) -> Result<(), AgentError> {
        let response = self
            .client
            .request(self.method.clone(), &self.endpoint)
            .header(FILENAME_HEADER, filename)
            .header(TIMESTAMP_HEADER, payload.timestamp.to_string())
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(payload.data.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            metrics::counter!(m::AGENT_PAYLOADS_REJECTED_TOTAL).increment(1);
            return Err(AgentError::Rejected {
                path: filename.to_owned(),
                status: status.as_u16(),
            });
        }

        metrics::counter!(m::AGENT_PAYLOADS_DELIVERED_TOTAL).increment(1);
        metrics::counter!(m::AGENT_BYTES_DELIVERED_TOTAL).increment(payload.data.len() as u64);
        tracing::debug!(filename, timestamp = payload.timestamp, bytes = payload.data.len(), "delivered");
        Ok(())
    }
}
