//! Configuration schema types for the Civic desktop shell.
//!
//! All structs use `serde(default)` so partial configs and partial
//! override layers work correctly.

mod startup;
mod storage;
mod system;

pub use startup::*;
pub use storage::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CivicConfig {
    pub startup: StartupConfig,
    pub splash: SplashConfig,
    pub parallel: ParallelConfig,
    pub storage: StorageConfig,
    pub health: HealthConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}
