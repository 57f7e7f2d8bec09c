use std::path::PathBuf;

use async_trait::async_trait;
use civic_startup::StorageProbe;

const WRITE_MARKER: &str = ".civic-write-check";

/// Local data directory as the application store.
///
/// Reachable means the directory exists and accepts writes. The schema is
/// compatible when `schema_version` matches this build; a fresh directory is
/// stamped with the current version.
#[derive(Debug, Clone)]
pub struct FileStorageProbe {
    data_dir: PathBuf,
    schema_file: PathBuf,
    expected: u32,
}

impl FileStorageProbe {
    pub fn new(data_dir: impl Into<PathBuf>, schema_file: impl Into<PathBuf>, expected: u32) -> Self {
        Self {
            data_dir: data_dir.into(),
            schema_file: schema_file.into(),
            expected,
        }
    }
}

#[async_trait]
impl StorageProbe for FileStorageProbe {
    async fn is_reachable(&self) -> Result<(), String> {
        let dir = self.data_dir.display();
        let meta = tokio::fs::metadata(&self.data_dir)
            .await
            .map_err(|e| format!("{dir}: {e}"))?;
        if !meta.is_dir() {
            return Err(format!("{dir} is not a directory"));
        }
        let marker = self.data_dir.join(WRITE_MARKER);
        tokio::fs::write(&marker, b"ok")
            .await
            .map_err(|e| format!("{dir} is not writable: {e}"))?;
        tokio::fs::remove_file(&marker)
            .await
            .map_err(|e| format!("{}: {e}", marker.display()))?;
        Ok(())
    }

    async fn validate_schema(&self) -> Result<(), String> {
        match tokio::fs::read_to_string(&self.schema_file).await {
            Ok(text) => {
                let found: u32 = text
                    .trim()
                    .parse()
                    .map_err(|_| format!("unreadable schema version '{}'", text.trim()))?;
                check_version(found, self.expected)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&self.schema_file, format!("{}\n", self.expected))
                    .await
                    .map_err(|e| format!("{}: {e}", self.schema_file.display()))?;
                tracing::info!(version = self.expected, "new data directory stamped");
                Ok(())
            }
            Err(e) => Err(format!("{}: {e}", self.schema_file.display())),
        }
    }
}

fn check_version(found: u32, expected: u32) -> Result<(), String> {
    if found > expected {
        Err(format!(
            "data was written by a newer release (schema {found}, this build reads {expected})"
        ))
    } else if found < expected {
        Err(format!(
            "data needs migrating from schema {found} to {expected}"
        ))
    } else {
        Ok(())
    }
}
