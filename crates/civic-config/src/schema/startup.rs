//! Startup sequence configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestration timeouts and degraded-mode policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// How long the shell waits for storage readiness before continuing
    /// in degraded mode (valid range: 1-300).
    pub background_wait_secs: u64,
    /// Continue into the main window even when mandatory storage failed.
    pub allow_degraded: bool,
    /// Timeout applied to startup tasks that do not declare their own.
    pub default_task_timeout_secs: u64,
    /// How long the splash waits for the main window's first render.
    pub first_render_timeout_secs: u64,
}

impl StartupConfig {
    pub fn background_wait(&self) -> Duration {
        Duration::from_secs(self.background_wait_secs)
    }

    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_secs(self.default_task_timeout_secs)
    }

    pub fn first_render_timeout(&self) -> Duration {
        Duration::from_secs(self.first_render_timeout_secs)
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            background_wait_secs: 30,
            allow_degraded: false,
            default_task_timeout_secs: 30,
            first_render_timeout_secs: 10,
        }
    }
}

/// Splash surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplashConfig {
    pub enabled: bool,
    /// Decorative asset shown by the splash. Empty means none.
    pub asset: String,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            asset: String::new(),
        }
    }
}

/// Parallel bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum number of bootstrap operations running at once (1-64).
    pub max_concurrency: u32,
    /// Per-operation timeout in seconds. 0 disables the timeout.
    pub operation_timeout_secs: u64,
}

impl ParallelConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            operation_timeout_secs: 20,
        }
    }
}
