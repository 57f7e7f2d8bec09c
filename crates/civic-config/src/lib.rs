//! Civic configuration system.
//!
//! Layered TOML configuration with environment and secret overrides and
//! full validation. All sections use sensible defaults so partial configs
//! and partial override layers work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use civic_config::load_config;
//!
//! let layered = load_config().expect("failed to load config");
//! println!("{}", layered.config().startup.background_wait_secs);
//! ```

pub mod layered;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use layered::{ConfigBuilder, LayeredConfig, MapSecretStore, SecretStore};
pub use schema::{CivicConfig, CONFIG_SCHEMA_VERSION};

use civic_common::ConfigError;

/// Environment variable naming the active environment (`config.<env>.toml`).
pub const ENVIRONMENT_VAR: &str = "CIVIC_ENVIRONMENT";

/// Load config from the platform default path.
///
/// Creates a documented default `config.toml` if none exists, applies the
/// `CIVIC_ENVIRONMENT` override file and `CIVIC__` variables, and validates
/// the merged result.
pub fn load_config() -> Result<LayeredConfig, ConfigError> {
    ConfigBuilder::new()
        .base_file(toml_loader::default_config_path()?)
        .create_if_missing(true)
        .environment(std::env::var(ENVIRONMENT_VAR).ok())
        .build()
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &CivicConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&CivicConfig::default());
        for section in [
            "startup", "splash", "parallel", "storage", "health", "telemetry", "logging",
        ] {
            assert!(json.contains(&format!("\"{section}\"")), "{section}");
        }
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_template_parses_to_defaults() {
        let config: CivicConfig = toml::from_str(&toml_loader::default_config_toml()).unwrap();
        assert_eq!(config.startup.background_wait_secs, 30);
        assert!(validation::validate(&config).is_ok());
    }
}
