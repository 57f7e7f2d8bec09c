//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_civic_config.toml"));
    assert!(matches!(
        result,
        Err(civic_common::ConfigError::FileNotFound(_))
    ));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[startup]
background_wait_secs = 12

[storage]
mandatory = false
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.startup.background_wait_secs, 12);
    assert!(!config.storage.mandatory);
    // Defaults preserved
    assert_eq!(config.storage.schema_version, 3);
    assert!(config.health.enabled);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(
        result,
        Err(civic_common::ConfigError::ParseError(_))
    ));
}

#[test]
fn wrong_value_type_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[storage]\nmandatory = \"sometimes\"\n").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(
        result,
        Err(civic_common::ConfigError::ParseError(_))
    ));
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("civic").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.startup.background_wait_secs, 30);
}

#[test]
fn environment_path_inserts_environment_before_extension() {
    let base = Path::new("/etc/civic/config.toml");
    assert_eq!(
        environment_config_path(base, "staging"),
        Path::new("/etc/civic/config.staging.toml")
    );
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("civic"));
        assert!(path_str.ends_with("config.toml"));
    }
}
