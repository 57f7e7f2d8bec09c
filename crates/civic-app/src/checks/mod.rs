//! Storage, health and telemetry checks for background initialization.

mod probes;
mod storage;
mod telemetry;

pub use probes::{DirectoryWritable, DiskSpaceMarker, StorageLatency};
pub use storage::FileStorageProbe;
pub use telemetry::CollectorWarmup;
