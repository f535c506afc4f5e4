//! Orchestrator assembly, lifecycle and reload.

use std::path::Path;
use std::time::Duration;

use logship_core::config::LogshipConfig;
use logship_daemon::cli::Role;
use logship_daemon::orchestrator::{Orchestrator, RolePipeline, validate_role};

fn agent_config(watch_dir: &Path) -> LogshipConfig {
    let mut config = LogshipConfig::default();
    config.agent.watch_dir = watch_dir.display().to_string();
    config.agent.destination_url = "http://127.0.0.1:1/".to_owned();
    config.agent.extract_command = vec!["true".to_owned()];
    config.agent.probe_delay_secs = 1;
    config.agent.probe_max_attempts = 1;
    config
}

fn collector_config(output_dir: &Path) -> LogshipConfig {
    let mut config = LogshipConfig::default();
    config.collector.listen_addr = "127.0.0.1".to_owned();
    config.collector.port = 0;
    config.collector.output_dir = output_dir.display().to_string();
    config
}

fn write_config(path: &Path, config: &LogshipConfig) {
    std::fs::write(path, toml::to_string(config).unwrap()).unwrap();
}

#[test]
fn builds_agent_role() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::build_from_config(agent_config(dir.path()), Role::Agent)
        .unwrap();
    assert_eq!(orchestrator.role(), Role::Agent);
    assert!(matches!(orchestrator.pipeline(), RolePipeline::Agent(_)));
    assert!(orchestrator.collector_addr().is_none());
}

#[test]
fn invalid_include_pattern_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = agent_config(dir.path());
    config.agent.include_pattern = "([unclosed".to_owned();

    let err = Orchestrator::build_from_config(config, Role::Agent).unwrap_err();
    assert!(err.to_string().contains("include_pattern"), "{err}");
}

#[test]
fn validate_role_checks_only_the_chosen_role() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = collector_config(dir.path());
    config.agent.exclude_pattern = "*.log".to_owned();

    assert!(validate_role(&config, Role::Collector).is_ok());
    assert!(validate_role(&config, Role::Agent).is_err());
}

#[test]
fn collector_rejects_unparseable_listen_addr() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = collector_config(dir.path());
    config.collector.listen_addr = "collector.local".to_owned();

    assert!(Orchestrator::build_from_config(config, Role::Collector).is_err());
}

#[tokio::test]
async fn health_before_start_is_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::build_from_config(agent_config(dir.path()), Role::Agent)
        .unwrap();

    let health = orchestrator.health().await;
    assert_eq!(health.role, "agent");
    assert!(health.status.is_unhealthy());
}

#[tokio::test]
async fn collector_runs_until_shutdown_future_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator =
        Orchestrator::build_from_config(collector_config(dir.path()), Role::Collector).unwrap();

    orchestrator
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    // stopped again after the shutdown future resolved
    assert!(orchestrator.health().await.status.is_unhealthy());
}

#[tokio::test]
async fn collector_bind_conflict_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = collector_config(dir.path());
    config.collector.port = taken.local_addr().unwrap().port();

    let mut orchestrator = Orchestrator::build_from_config(config, Role::Collector).unwrap();
    let err = orchestrator.run_until(std::future::pending()).await.unwrap_err();
    assert!(err.to_string().contains("collector"), "{err}");
}

#[tokio::test]
async fn reload_applies_changed_agent_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logship.toml");
    let mut config = agent_config(dir.path());
    write_config(&path, &config);

    let mut orchestrator = Orchestrator::build(&path, Role::Agent).await.unwrap();
    assert_eq!(orchestrator.config().agent.tick_interval_secs, 60);

    config.agent.tick_interval_secs = 5;
    write_config(&path, &config);
    assert!(orchestrator.reload().await.unwrap());
    assert_eq!(orchestrator.config().agent.tick_interval_secs, 5);

    // same file again: nothing to apply
    assert!(!orchestrator.reload().await.unwrap());
}

#[tokio::test]
async fn reload_keeps_current_config_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logship.toml");
    write_config(&path, &agent_config(dir.path()));

    let mut orchestrator = Orchestrator::build(&path, Role::Agent).await.unwrap();

    std::fs::write(&path, "[agent]\ntick_interval_secs = 0\n").unwrap();
    assert!(orchestrator.reload().await.is_err());

    std::fs::write(&path, "agent = [[[").unwrap();
    assert!(orchestrator.reload().await.is_err());

    assert_eq!(orchestrator.config().agent.tick_interval_secs, 60);
}

#[tokio::test]
async fn reload_for_collector_requires_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logship.toml");
    let mut config = collector_config(dir.path());
    write_config(&path, &config);

    let mut orchestrator = Orchestrator::build(&path, Role::Collector).await.unwrap();
    config.collector.flush_threshold = 3;
    write_config(&path, &config);

    assert!(!orchestrator.reload().await.unwrap());
    assert_eq!(orchestrator.config().collector.flush_threshold, 3);
}

#[tokio::test]
async fn reload_without_config_path_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(agent_config(dir.path()), Role::Agent)
        .unwrap();
    assert!(!orchestrator.reload().await.unwrap());
}

#[tokio::test]
async fn build_reports_missing_config_file() {
    let err = Orchestrator::build(Path::new("/nonexistent/logship.toml"), Role::Agent)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("not found"), "{err}");
}
