use std::path::PathBuf;

use civic_config::schema::SplashConfig;
use civic_startup::progress::ProgressSnapshot;
use civic_startup::{SplashError, SplashSurface};

use super::Console;

/// Banner plus one progress line per percentage step.
pub struct ConsoleSplash {
    asset: Option<PathBuf>,
    console: Console,
    last_percentage: Option<u8>,
}

impl ConsoleSplash {
    pub fn new(settings: &SplashConfig, console: Console) -> Self {
        let asset = settings.asset.trim();
        Self {
            asset: (!asset.is_empty()).then(|| PathBuf::from(asset)),
            console,
            last_percentage: None,
        }
    }
}

impl SplashSurface for ConsoleSplash {
    fn show(&mut self) -> Result<(), SplashError> {
        if let Some(asset) = &self.asset {
            match std::fs::read_to_string(asset) {
                Ok(banner) => self.console.line(banner.trim_end()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SplashError::AssetMissing(asset.clone()));
                }
                Err(e) => return Err(SplashError::Surface(format!("{}: {e}", asset.display()))),
            }
        }
        self.console
            .line(format!("Civic {} is starting", env!("CARGO_PKG_VERSION")));
        Ok(())
    }

    fn update(&mut self, snapshot: &ProgressSnapshot) {
        if self.last_percentage == Some(snapshot.percentage) {
            return;
        }
        self.last_percentage = Some(snapshot.percentage);
        self.console
            .line(format!("[{:>3}%] {}", snapshot.percentage, snapshot.message));
    }

    fn close(&mut self) {
        self.console.line("");
    }
}
