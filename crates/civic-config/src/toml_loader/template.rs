//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub fn default_config_toml() -> String {
    r##"# Civic desktop configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.
# Per-environment overrides go in config.<environment>.toml next to this file.
# Environment variables win over both files: CIVIC__STORAGE__MANDATORY=false

[startup]
# background_wait_secs = 30       # 1-300, wait for storage before showing the window
# allow_degraded = false          # show the window even if mandatory storage failed
# default_task_timeout_secs = 30  # 1-600
# first_render_timeout_secs = 10  # 1-120

[splash]
# enabled = true
# asset = ""                      # decorative splash file, empty = none

[parallel]
# max_concurrency = 4             # 1-64
# operation_timeout_secs = 20     # 0 = no timeout

[storage]
# mandatory = true
# data_dir = ""                   # empty = platform data directory
# schema_version = 3
# probe_timeout_secs = 5          # 1-60

[health]
# enabled = true
# interval_secs = 60              # 5-3600
# probe_timeout_secs = 5          # 1-60

[telemetry]
# enabled = true
# endpoint = ""
# warmup_timeout_secs = 3

[logging]
# level = "INFO"                  # TRACE, DEBUG, INFO, WARNING, ERROR
# directives = []                 # extra filter directives, e.g. ["civic_startup=debug"]
# startup_diagnostics = false     # also enabled by CIVIC_STARTUP_DIAGNOSTICS=1
# directory = ""                  # empty = platform data directory/logs
"##
    .to_string()
}
