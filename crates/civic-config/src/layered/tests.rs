//! Tests for layer precedence.

use super::*;
use civic_common::ConfigError;

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn later_layers_win() {
    let dir = tempfile::tempdir().unwrap();
    let base = write(
        dir.path(),
        "config.toml",
        "[storage]\nmandatory = true\nschema_version = 3\nprobe_timeout_secs = 5\n",
    );
    write(
        dir.path(),
        "config.staging.toml",
        "[storage]\nmandatory = false\nprobe_timeout_secs = 9\n",
    );

    let layered = ConfigBuilder::new()
        .base_file(&base)
        .environment(Some("staging".into()))
        .env_vars([("CIVIC__STORAGE__PROBE_TIMEOUT_SECS", "12")])
        .secret_store(
            MapSecretStore::new("test-vault").with("storage.connection_string", "server=ledger"),
        )
        .build()
        .unwrap();

    let storage = &layered.config().storage;
    assert!(!storage.mandatory, "environment file overrides base");
    assert_eq!(storage.probe_timeout_secs, 12, "env var overrides environment file");
    assert_eq!(storage.schema_version, 3, "base value survives");
    assert_eq!(storage.connection_string, "server=ledger");
    assert_eq!(layered.sources().len(), 4);
    assert_eq!(layered.environment(), Some("staging"));
}

#[test]
fn secrets_override_environment_variables() {
    let layered = ConfigBuilder::new()
        .env_vars([("CIVIC__TELEMETRY__ENDPOINT", "https://env.example")])
        .secret_store(MapSecretStore::new("vault").with("telemetry.endpoint", "https://vault.example"))
        .build()
        .unwrap();
    assert_eq!(layered.config().telemetry.endpoint, "https://vault.example");
}

#[test]
fn missing_files_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let layered = ConfigBuilder::new()
        .base_file(dir.path().join("config.toml"))
        .environment(Some("production".into()))
        .env_vars(Vec::<(String, String)>::new())
        .build()
        .unwrap();
    assert!(layered.sources().is_empty());
    assert_eq!(layered.config().startup.background_wait_secs, 30);
}

#[test]
fn create_if_missing_writes_template() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("civic").join("config.toml");
    let layered = ConfigBuilder::new()
        .base_file(&base)
        .create_if_missing(true)
        .env_vars(Vec::<(String, String)>::new())
        .build()
        .unwrap();
    assert!(base.exists());
    assert_eq!(layered.sources().len(), 1);
}

#[test]
fn unrelated_env_vars_are_ignored() {
    let layered = ConfigBuilder::new()
        .env_vars([("PATH", "/usr/bin"), ("CIVIC_ENVIRONMENT", "dev")])
        .build()
        .unwrap();
    assert!(layered.sources().is_empty());
}

#[test]
fn invalid_merged_values_fail_validation() {
    let result = ConfigBuilder::new()
        .env_vars([("CIVIC__PARALLEL__MAX_CONCURRENCY", "0")])
        .build();
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn failing_secret_store_is_a_source_error() {
    struct Sealed;
    impl SecretStore for Sealed {
        fn name(&self) -> &str {
            "sealed"
        }
        fn load(&self) -> Result<Vec<(String, String)>, ConfigError> {
            Err(ConfigError::SourceError("vault sealed".into()))
        }
    }

    let result = ConfigBuilder::new()
        .env_vars(Vec::<(String, String)>::new())
        .secret_store(Sealed)
        .build();
    assert!(matches!(result, Err(ConfigError::SourceError(msg)) if msg.contains("sealed")));
}

#[test]
fn get_section_and_value_read_merged_layers() {
    let layered = ConfigBuilder::new()
        .env_vars([
            ("CIVIC__HEALTH__INTERVAL_SECS", "30"),
            ("CIVIC__HEALTH__ENABLED", "false"),
        ])
        .build()
        .unwrap();

    let section = layered.get_section("health").unwrap();
    assert_eq!(section.len(), 2);
    assert_eq!(
        layered.get_value("health.interval_secs"),
        Some(&toml::Value::Integer(30))
    );
    assert_eq!(layered.get::<bool>("health.enabled").unwrap(), Some(false));
    assert_eq!(layered.get::<u64>("storage.probe_timeout_secs").unwrap(), None);
    assert!(layered.get::<bool>("health.interval_secs").is_err());
}
