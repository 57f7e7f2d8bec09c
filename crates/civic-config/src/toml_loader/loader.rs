//! Core TOML file reading.

use crate::schema::CivicConfig;
use civic_common::ConfigError;
use std::path::Path;
use tracing::{debug, info};

/// Read a TOML file into an untyped table, for use as a config layer.
///
/// A missing file is reported as [`ConfigError::FileNotFound`] so callers
/// can decide whether the layer is optional.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let table: toml::Table = content.parse().map_err(|e| {
        ConfigError::ParseError(format!("failed to parse {}: {e}", path.display()))
    })?;

    debug!(path = %path.display(), keys = table.len(), "read config layer");
    Ok(table)
}

/// Load a single config file into the typed schema, using defaults for
/// anything the file leaves out. No layering, no validation.
pub fn load_from_path(path: &Path) -> Result<CivicConfig, ConfigError> {
    let table = load_table(path)?;
    let config = CivicConfig::deserialize_from(table)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

impl CivicConfig {
    pub(crate) fn deserialize_from(table: toml::Table) -> Result<Self, ConfigError> {
        toml::Value::Table(table)
            .try_into::<CivicConfig>()
            .map_err(|e| ConfigError::ParseError(format!("invalid config value: {e}")))
    }
}
