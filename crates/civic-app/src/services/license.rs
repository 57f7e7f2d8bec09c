use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

/// Days before expiry at which startup starts warning.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseStatus {
    /// No license file: the free single-seat edition.
    Community,
    Licensed {
        holder: String,
        seats: u32,
        expires: NaiveDate,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("could not read license file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("license file is malformed: {0}")]
    Malformed(String),

    #[error("license for {holder} expired on {expires}")]
    Expired { holder: String, expires: NaiveDate },
}

#[derive(Debug, Deserialize)]
struct LicenseFile {
    holder: String,
    #[serde(default = "default_seats")]
    seats: u32,
    /// `YYYY-MM-DD`
    expires: String,
}

fn default_seats() -> u32 {
    1
}

/// Checks the installed license file.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    path: PathBuf,
}

impl LicenseVerifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn verify(&self, today: NaiveDate) -> Result<LicenseStatus, LicenseError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LicenseStatus::Community);
            }
            Err(source) => {
                return Err(LicenseError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        check_license(&text, today)
    }
}

/// Parse a license document and check it against `today`.
pub fn check_license(text: &str, today: NaiveDate) -> Result<LicenseStatus, LicenseError> {
    let file: LicenseFile =
        toml::from_str(text).map_err(|e| LicenseError::Malformed(e.message().to_string()))?;
    if file.holder.trim().is_empty() {
        return Err(LicenseError::Malformed("holder is empty".into()));
    }
    if file.seats == 0 {
        return Err(LicenseError::Malformed("seats must be at least 1".into()));
    }
    let expires = NaiveDate::parse_from_str(file.expires.trim(), "%Y-%m-%d").map_err(|e| {
        LicenseError::Malformed(format!("expires '{}': {e}", file.expires))
    })?;
    if expires < today {
        return Err(LicenseError::Expired {
            holder: file.holder,
            expires,
        });
    }
    Ok(LicenseStatus::Licensed {
        holder: file.holder,
        seats: file.seats,
        expires,
    })
}
