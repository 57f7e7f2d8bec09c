use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

const TEMPLATE_EXTENSION: &str = "tmpl";

/// Report templates (`*.tmpl` in the templates directory), read ahead of
/// first use.
#[derive(Debug)]
pub struct ReportTemplates {
    dir: PathBuf,
    loaded: RwLock<BTreeMap<String, String>>,
}

impl ReportTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load every template. Stops early, keeping what was read, when
    /// `token` is cancelled.
    pub async fn warm(&self, token: &CancellationToken) -> Result<usize, String> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(format!("{}: {e}", self.dir.display())),
        };

        let mut loaded = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("{}: {e}", self.dir.display()))?
        {
            if token.is_cancelled() {
                break;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let body = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("{}: {e}", path.display()))?;
            loaded.insert(name, body);
        }

        let count = loaded.len();
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        tracing::debug!(count, dir = %self.dir.display(), "report templates warmed");
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
