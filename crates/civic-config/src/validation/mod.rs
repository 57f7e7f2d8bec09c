//! Full configuration validation.
//!
//! Each domain has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod services;
mod startup;


use crate::schema::CivicConfig;
use civic_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CivicConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    startup::validate_startup(&mut errors, config);
    startup::validate_parallel(&mut errors, config);
    services::validate_storage(&mut errors, config);
    services::validate_health(&mut errors, config);
    services::validate_telemetry(&mut errors, config);
    services::validate_logging(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
