//! Prometheus scrape endpoint.
//!
//! Uses the HTTP listener built into `metrics-exporter-prometheus`; every
//! `metrics::counter!` and friend in the workspace records into it once
//! [`install_metrics_recorder`] has run.

use std::net::SocketAddr;

use anyhow::Result;
use logship_core::config::MetricsConfig;
use logship_core::metrics as m;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global recorder and start the scrape listener.
///
/// Call at most once per process.
///
/// # Errors
///
/// - the endpoint is not `/metrics`
/// - the listen address does not parse
/// - a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Publish the constant build-info gauge for this process.
pub fn record_build_info(role: &str) {
    metrics::gauge!(
        m::DAEMON_BUILD_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
        m::LABEL_ROLE => role.to_owned()
    )
    .set(1.0);
}
