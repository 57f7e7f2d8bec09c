//! Logger installation and runtime filter control.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use civic_config::schema::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer};

/// File written when verbose startup diagnostics are enabled.
pub const DIAGNOSTICS_FILE: &str = "startup-diagnostics.log";
/// Environment toggle for verbose startup diagnostics.
pub const DIAGNOSTICS_ENV: &str = "CIVIC_STARTUP_DIAGNOSTICS";
const DIAGNOSTICS_FILTER: &str = "civic_startup=trace,civic_app=trace,civic_config=debug,info";

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("could not install logger: {0}")]
    Install(String),
}

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Console filter when `RUST_LOG` is unset.
    pub default_directive: String,
    /// A filter given on the command line; configuration will not override it.
    pub pinned_directive: Option<String>,
    /// Enable the diagnostics file from the start.
    pub startup_diagnostics: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_directive: "info".into(),
            pinned_directive: None,
            startup_diagnostics: diagnostics_requested(),
            log_dir: default_log_dir(),
        }
    }
}

/// Whether `CIVIC_STARTUP_DIAGNOSTICS` asks for verbose diagnostics.
pub fn diagnostics_requested() -> bool {
    std::env::var(DIAGNOSTICS_ENV)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("civic")
        .join("logs")
}

type FilterSetter = Arc<dyn Fn(EnvFilter) -> Result<(), String> + Send + Sync>;

/// Handle to the installed logger's filters.
#[derive(Clone)]
pub struct LogControl {
    console: Option<FilterSetter>,
    diagnostics: Option<FilterSetter>,
    pinned: bool,
    diagnostics_path: Option<PathBuf>,
}

impl LogControl {
    /// A control that changes nothing. For tests and tools that log elsewhere.
    pub fn disabled() -> Self {
        Self {
            console: None,
            diagnostics: None,
            pinned: false,
            diagnostics_path: None,
        }
    }

    pub fn diagnostics_path(&self) -> Option<&Path> {
        self.diagnostics_path.as_deref()
    }

    /// Apply the `[logging]` section. A pinned console filter is kept.
    pub fn apply(&self, config: &LoggingConfig) -> Result<(), DiagnosticsError> {
        if !self.pinned {
            if let Some(set_console) = &self.console {
                let directive = config.filter();
                set_console(parse_filter(&directive)?).map_err(|reason| DiagnosticsError::Filter {
                    directive: directive.clone(),
                    reason,
                })?;
                tracing::debug!(filter = %directive, "console log filter updated from config");
            }
        }
        if config.startup_diagnostics {
            self.enable_diagnostics()?;
        }
        Ok(())
    }

    /// Start writing the verbose diagnostics file.
    pub fn enable_diagnostics(&self) -> Result<(), DiagnosticsError> {
        if let Some(set_diagnostics) = &self.diagnostics {
            set_diagnostics(parse_filter(DIAGNOSTICS_FILTER)?)
                .map_err(DiagnosticsError::Install)?;
            if let Some(path) = &self.diagnostics_path {
                tracing::info!(path = %path.display(), "startup diagnostics enabled");
            }
        }
        Ok(())
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter, DiagnosticsError> {
    EnvFilter::try_new(directive).map_err(|e| DiagnosticsError::Filter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber: a stderr layer with a reloadable filter and
/// a diagnostics file layer that stays silent until enabled.
pub fn init_logging(options: &LoggingOptions) -> Result<LogControl, DiagnosticsError> {
    let (console_filter, pinned) = match (&options.pinned_directive, std::env::var("RUST_LOG")) {
        (Some(directive), _) => (parse_filter(directive)?, true),
        (None, Ok(env)) if !env.trim().is_empty() => (parse_filter(&env)?, true),
        _ => (parse_filter(&options.default_directive)?, false),
    };
    let initial_diagnostics = if options.startup_diagnostics {
        parse_filter(DIAGNOSTICS_FILTER)?
    } else {
        parse_filter("off")?
    };

    let (console_filter, console_handle) = reload::Layer::new(console_filter);
    let (diagnostics_filter, diagnostics_handle) = reload::Layer::new(initial_diagnostics);

    let diagnostics_path = options.log_dir.join(DIAGNOSTICS_FILE);
    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_filter(console_filter);
    let diagnostics_layer = fmt::layer()
        .with_writer(Mutex::new(LazyFile::new(diagnostics_path.clone())))
        .with_ansi(false)
        .with_thread_names(true)
        .with_filter(diagnostics_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(diagnostics_layer)
        .try_init()
        .map_err(|e| DiagnosticsError::Install(e.to_string()))?;

    let console: FilterSetter = Arc::new(move |filter: EnvFilter| {
        console_handle.reload(filter).map_err(|e| e.to_string())
    });
    let diagnostics: FilterSetter = Arc::new(move |filter: EnvFilter| {
        diagnostics_handle.reload(filter).map_err(|e| e.to_string())
    });

    if options.startup_diagnostics {
        tracing::info!(path = %diagnostics_path.display(), "startup diagnostics enabled");
    }

    Ok(LogControl {
        console: Some(console),
        diagnostics: Some(diagnostics),
        pinned,
        diagnostics_path: Some(diagnostics_path),
    })
}

/// Appends to a file created on first write, so an idle diagnostics layer
/// leaves nothing on disk.
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_config::schema::LogLevel;

    #[test]
    fn lazy_file_is_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(DIAGNOSTICS_FILE);
        let mut file = LazyFile::new(path.clone());

        file.flush().unwrap();
        assert!(!path.exists());

        file.write_all(b"phase=bootstrap\n").unwrap();
        file.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "phase=bootstrap\n");
    }

    #[test]
    fn disabled_control_accepts_any_config() {
        let control = LogControl::disabled();
        let config = LoggingConfig {
            level: LogLevel::Debug,
            startup_diagnostics: true,
            ..Default::default()
        };
        assert!(control.apply(&config).is_ok());
        assert!(control.diagnostics_path().is_none());
    }

    #[test]
    fn apply_rejects_bad_directives() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let control = LogControl {
            console: Some(Arc::new(move |filter: EnvFilter| {
                sink.lock().unwrap().push(filter.to_string());
                Ok(())
            })),
            diagnostics: None,
            pinned: false,
            diagnostics_path: None,
        };

        let good = LoggingConfig {
            directives: vec!["civic_startup=trace".into()],
            ..Default::default()
        };
        control.apply(&good).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].contains("civic_startup=trace"));

        let bad = LoggingConfig {
            directives: vec!["civic_startup=loud".into()],
            ..Default::default()
        };
        assert!(matches!(control.apply(&bad), Err(DiagnosticsError::Filter { .. })));
    }

    #[test]
    fn pinned_console_filter_is_kept() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let control = LogControl {
            console: Some(Arc::new(move |_: EnvFilter| {
                *counter.lock().unwrap() += 1;
                Ok(())
            })),
            diagnostics: None,
            pinned: true,
            diagnostics_path: None,
        };
        control.apply(&LoggingConfig::default()).unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
