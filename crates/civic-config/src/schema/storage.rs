//! Storage, health and telemetry configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage reachability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Abort startup when storage is unreachable or incompatible.
    pub mandatory: bool,
    /// Data directory. Empty means the platform data dir.
    pub data_dir: String,
    /// Schema version this build can open.
    pub schema_version: u32,
    pub probe_timeout_secs: u64,
    /// Usually supplied by the secret store layer, never by the base file.
    pub connection_string: String,
}

impl StorageConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mandatory: true,
            data_dir: String::new(),
            schema_version: 3,
            probe_timeout_secs: 5,
            connection_string: String::new(),
        }
    }
}

/// Periodic health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Seconds between periodic probe runs (5-3600).
    pub interval_secs: u64,
    pub probe_timeout_secs: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            probe_timeout_secs: 5,
        }
    }
}

/// Telemetry warm-up settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub warmup_timeout_secs: u64,
}

impl TelemetryConfig {
    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_secs(self.warmup_timeout_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            warmup_timeout_secs: 3,
        }
    }
}
