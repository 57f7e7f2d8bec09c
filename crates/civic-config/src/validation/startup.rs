//! Validation for the startup, splash and parallel sections.

use crate::schema::CivicConfig;

use super::helpers::validate_range;

pub(crate) fn validate_startup(errors: &mut Vec<String>, config: &CivicConfig) {
    let startup = &config.startup;
    validate_range(
        errors,
        "startup.background_wait_secs",
        startup.background_wait_secs,
        1,
        300,
    );
    validate_range(
        errors,
        "startup.default_task_timeout_secs",
        startup.default_task_timeout_secs,
        1,
        600,
    );
    validate_range(
        errors,
        "startup.first_render_timeout_secs",
        startup.first_render_timeout_secs,
        1,
        120,
    );
}

pub(crate) fn validate_parallel(errors: &mut Vec<String>, config: &CivicConfig) {
    validate_range(
        errors,
        "parallel.max_concurrency",
        u64::from(config.parallel.max_concurrency),
        1,
        64,
    );
    validate_range(
        errors,
        "parallel.operation_timeout_secs",
        config.parallel.operation_timeout_secs,
        0,
        600,
    );
}
