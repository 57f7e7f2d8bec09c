//! Where the application keeps its files.

use std::path::{Path, PathBuf};

use civic_config::CivicConfig;

const APP_NAME: &str = "civic";

/// Resolved data and log locations.
///
/// - data: `storage.data_dir`, or the platform data dir (`~/.local/share/civic`)
/// - logs: `logging.directory`, or the platform local data dir (`.../civic/logs`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl AppPaths {
    pub fn from_config(config: &CivicConfig) -> Self {
        Self {
            data_dir: non_empty(&config.storage.data_dir).unwrap_or_else(default_data_dir),
            log_dir: non_empty(&config.logging.directory)
                .unwrap_or_else(civic_startup::diagnostics::default_log_dir),
        }
    }

    /// Everything under one root. Used by tests and portable installs.
    pub fn under(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            log_dir: root.join("logs"),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn license_file(&self) -> PathBuf {
        self.data_dir.join("license.toml")
    }

    pub fn fund_ledger(&self) -> PathBuf {
        self.data_dir.join("funds.csv")
    }

    pub fn schema_file(&self) -> PathBuf {
        self.data_dir.join("schema_version")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.toml")
    }

    /// Pre-1.0 settings, migrated on first start.
    pub fn legacy_settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.ini")
    }

    /// Directories the bootstrap creates before anything else runs.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.data_dir.clone(),
            self.reports_dir(),
            self.templates_dir(),
            self.cache_dir(),
            self.log_dir.clone(),
        ]
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn crash_report_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("crash-reports")
}

fn non_empty(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
