use anyhow::Result;
use clap::Parser;

use logship_core::config::LogshipConfig;
use logship_daemon::cli::DaemonCli;
use logship_daemon::logging;
use logship_daemon::orchestrator::{Orchestrator, validate_role};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LogshipConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;

    // CLI flags take precedence over file and environment
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        validate_role(&config, cli.role)
            .map_err(|e| anyhow::anyhow!("configuration is invalid: {}", e))?;
        println!("configuration OK: {} ({})", cli.config.display(), cli.role);
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        role = %cli.role,
        config = %cli.config.display(),
        "logship-daemon starting"
    );

    let mut orchestrator =
        Orchestrator::build_from_config(config, cli.role)?.with_config_path(cli.config);
    orchestrator.run().await?;

    tracing::info!("logship-daemon shut down");
    Ok(())
}
