//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Extra `EnvFilter` directives appended after the level, e.g. `civic_startup=debug`.
    pub directives: Vec<String>,
    /// Write verbose startup diagnostics to a dedicated log file.
    pub startup_diagnostics: bool,
    /// Log directory. Empty means the platform data dir.
    pub directory: String,
}

impl LoggingConfig {
    /// Full filter string: level followed by any extra directives.
    pub fn filter(&self) -> String {
        std::iter::once(self.level.as_filter().to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directives: Vec::new(),
            startup_diagnostics: false,
            directory: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_joins_level_and_directives() {
        let config = LoggingConfig {
            level: LogLevel::Warning,
            directives: vec!["civic_startup=debug".into()],
            ..Default::default()
        };
        assert_eq!(config.filter(), "warn,civic_startup=debug");
    }
}
