use std::path::PathBuf;

use civic_startup::diagnostics::{default_log_dir, diagnostics_requested, LoggingOptions};
use clap::Parser;

/// Civic: municipal budget desktop.
#[derive(Parser, Debug, Clone)]
#[command(name = "civic", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Environment overlay to apply (`config.<environment>.toml`).
    /// Defaults to CIVIC_ENVIRONMENT.
    #[arg(long)]
    pub environment: Option<String>,

    /// Log filter override (trace, debug, info, warn, error, or directives).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Open the main window, wait for its first frame, close it and exit.
    #[arg(long)]
    pub smoke_test: bool,

    /// Open the main window even when mandatory storage is unavailable.
    #[arg(long)]
    pub allow_degraded: bool,

    /// Write verbose startup diagnostics to the log directory.
    /// Same as CIVIC_STARTUP_DIAGNOSTICS=1.
    #[arg(long)]
    pub startup_diagnostics: bool,
}

impl Args {
    pub fn logging_options(&self) -> LoggingOptions {
        LoggingOptions {
            default_directive: "info".into(),
            pinned_directive: self.log_level.clone(),
            startup_diagnostics: self.startup_diagnostics || diagnostics_requested(),
            log_dir: default_log_dir(),
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_full_startup() {
        let args = Args::try_parse_from(["civic"]).unwrap();
        assert!(!args.smoke_test);
        assert!(!args.allow_degraded);
        assert!(args.config.is_none());
        assert!(args.logging_options().pinned_directive.is_none());
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from([
            "civic",
            "--smoke-test",
            "--allow-degraded",
            "--config",
            "/etc/civic/config.toml",
            "--environment",
            "staging",
            "--log-level",
            "debug",
            "--startup-diagnostics",
        ])
        .unwrap();
        assert!(args.smoke_test);
        assert!(args.allow_degraded);
        assert_eq!(args.config, Some(PathBuf::from("/etc/civic/config.toml")));
        assert_eq!(args.environment.as_deref(), Some("staging"));

        let logging = args.logging_options();
        assert_eq!(logging.pinned_directive.as_deref(), Some("debug"));
        assert!(logging.startup_diagnostics);
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = Args::try_parse_from(["civic", "--fast"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
