//! Config path resolution and default file creation.

use civic_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::info;

use super::template::default_config_toml;

pub(crate) const APP_NAME: &str = "civic";

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::SourceError("could not determine config directory".into()))?;
    Ok(config_dir.join(APP_NAME).join("config.toml"))
}

/// Path of the per-environment override next to the base file:
/// `config.toml` + `staging` → `config.staging.toml`.
pub fn environment_config_path(base: &Path, environment: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".into());
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}.{environment}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{environment}"),
    };
    base.with_file_name(file_name)
}

/// Create a default TOML config file with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::SourceError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::SourceError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}
