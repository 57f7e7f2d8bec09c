//! Health probes run at startup and then periodically.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use civic_startup::HealthProbe;

/// Writes and removes a block-sized marker in the data directory. Fails
/// when the volume is full or read-only.
pub struct DiskSpaceMarker {
    dir: PathBuf,
    bytes: usize,
}

impl DiskSpaceMarker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bytes: 64 * 1024,
        }
    }
}

#[async_trait]
impl HealthProbe for DiskSpaceMarker {
    fn name(&self) -> &str {
        "disk-space"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> Result<(), String> {
        let marker = self.dir.join(".civic-space-check");
        let result = tokio::fs::write(&marker, vec![0u8; self.bytes]).await;
        let _ = tokio::fs::remove_file(&marker).await;
        result.map_err(|e| format!("cannot write {} KiB to {}: {e}", self.bytes / 1024, self.dir.display()))
    }
}

/// A directory exists, or can be created, and accepts writes.
pub struct DirectoryWritable {
    name: String,
    dir: PathBuf,
}

impl DirectoryWritable {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for DirectoryWritable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("{}: {e}", self.dir.display()))?;
        let marker = self.dir.join(".civic-write-check");
        tokio::fs::write(&marker, b"ok")
            .await
            .map_err(|e| format!("{} is not writable: {e}", self.dir.display()))?;
        let _ = tokio::fs::remove_file(&marker).await;
        Ok(())
    }
}

/// Round trip to the data directory stays under `limit`.
pub struct StorageLatency {
    dir: PathBuf,
    limit: Duration,
}

impl StorageLatency {
    pub fn new(dir: impl Into<PathBuf>, limit: Duration) -> Self {
        Self {
            dir: dir.into(),
            limit,
        }
    }
}

#[async_trait]
impl HealthProbe for StorageLatency {
    fn name(&self) -> &str {
        "storage-latency"
    }

    async fn check(&self) -> Result<(), String> {
        let started = Instant::now();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| format!("{}: {e}", self.dir.display()))?;
        entries
            .next_entry()
            .await
            .map_err(|e| format!("{}: {e}", self.dir.display()))?;
        let elapsed = started.elapsed();
        if elapsed > self.limit {
            return Err(format!(
                "storage responded in {} ms (limit {} ms)",
                elapsed.as_millis(),
                self.limit.as_millis()
            ));
        }
        Ok(())
    }
}
