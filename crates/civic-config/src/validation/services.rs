//! Validation for storage, health, telemetry and logging.

use crate::schema::CivicConfig;

use super::helpers::validate_range;

pub(crate) fn validate_storage(errors: &mut Vec<String>, config: &CivicConfig) {
    validate_range(
        errors,
        "storage.probe_timeout_secs",
        config.storage.probe_timeout_secs,
        1,
        60,
    );
    if config.storage.schema_version == 0 {
        errors.push("storage.schema_version must be at least 1".into());
    }
}

pub(crate) fn validate_health(errors: &mut Vec<String>, config: &CivicConfig) {
    validate_range(
        errors,
        "health.interval_secs",
        config.health.interval_secs,
        5,
        3600,
    );
    validate_range(
        errors,
        "health.probe_timeout_secs",
        config.health.probe_timeout_secs,
        1,
        60,
    );
}

pub(crate) fn validate_telemetry(errors: &mut Vec<String>, config: &CivicConfig) {
    let endpoint = &config.telemetry.endpoint;
    if !endpoint.is_empty() && !(endpoint.starts_with("https://") || endpoint.starts_with("http://"))
    {
        errors.push(format!(
            "telemetry.endpoint '{endpoint}' must be an http(s) URL"
        ));
    }
    validate_range(
        errors,
        "telemetry.warmup_timeout_secs",
        config.telemetry.warmup_timeout_secs,
        1,
        60,
    );
}

pub(crate) fn validate_logging(errors: &mut Vec<String>, config: &CivicConfig) {
    for directive in &config.logging.directives {
        if directive.trim().is_empty() || directive.contains(char::is_whitespace) {
            errors.push(format!("logging.directives entry '{directive}' is not a filter directive"));
        }
    }
}
