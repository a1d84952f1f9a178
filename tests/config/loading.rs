//! Layered configuration loading from YAML files.

use etl_orchestrator::config::{ConfigManager, ConfigurationError, OrchestratorConfig};
use std::fs;
use std::time::Duration;

#[test]
fn full_configuration_round_trips_from_yaml() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.yaml"),
        r"
scheduler:
  poll_interval_ms: 50
  scan_interval_ms: 1000
  max_threads: 6
  max_construct_failures: 5
database:
  url: postgresql://catalog.internal/etl
  max_connections: 4
logging:
  level: debug
  ansi: false
notification:
  enabled: true
  recipients:
    - oncall@example.com
",
    )
    .unwrap();

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
            .unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "staging");
    assert_eq!(manager.config_directory(), dir.path());
    assert_eq!(config.scheduler.poll_interval(), Duration::from_millis(50));
    assert_eq!(config.scheduler.scan_interval(), Duration::from_secs(1));
    assert_eq!(config.scheduler.max_threads, 6);
    assert_eq!(config.scheduler.max_construct_failures, 5);
    assert_eq!(config.database.url, "postgresql://catalog.internal/etl");
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.database.acquire_timeout_secs, 30);
    assert_eq!(config.logging.level, "debug");
    assert!(!config.logging.ansi);
    assert!(config.logging.directory.is_none());
    assert!(config.notification.enabled);
    assert_eq!(config.notification.recipients, vec!["oncall@example.com"]);
}

#[test]
fn malformed_yaml_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("base.yaml"), "scheduler: [unclosed\n").unwrap();

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::LoadError { .. }));
}

#[test]
fn wrong_field_type_is_a_deserialize_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.yaml"),
        "scheduler:\n  max_threads: many\n",
    )
    .unwrap();

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::DeserializeError { .. }));
}

#[test]
fn prebuilt_configuration_is_validated() {
    assert!(ConfigManager::from_config(OrchestratorConfig::for_testing(), "test").is_ok());

    let mut config = OrchestratorConfig::for_testing();
    config.scheduler.scan_interval_ms = 0;
    let err = ConfigManager::from_config(config, "test").unwrap_err();
    assert!(err.to_string().contains("scheduler.scan_interval_ms"));
}
