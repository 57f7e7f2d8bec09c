//! Splash screen lifecycle.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::progress::{ProgressReporter, ProgressSnapshot, SubscriptionId};
use crate::ui::{MarshalError, UiDispatcher};
use crate::util::lock;

#[derive(Debug, thiserror::Error)]
pub enum SplashError {
    #[error("splash asset missing: {0}")]
    AssetMissing(PathBuf),

    #[error("splash surface failed: {0}")]
    Surface(String),
}

/// A concrete splash window. Every method is called on the UI thread.
pub trait SplashSurface: Send {
    fn show(&mut self) -> Result<(), SplashError>;

    fn update(&mut self, snapshot: &ProgressSnapshot);

    /// Release the surface. Called at most once.
    fn close(&mut self);
}

enum SplashState {
    Pending(Box<dyn SplashSurface>),
    Visible(Box<dyn SplashSurface>),
    Skipped,
    Closed,
}

struct SplashInner {
    state: SplashState,
    subscription: Option<SubscriptionId>,
}

/// Shows one splash surface, feeds it progress, and closes it once.
#[derive(Clone)]
pub struct SplashController {
    inner: Arc<Mutex<SplashInner>>,
    ui: UiDispatcher,
    progress: ProgressReporter,
}

impl SplashController {
    pub fn new(surface: Box<dyn SplashSurface>, ui: UiDispatcher, progress: ProgressReporter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SplashInner {
                state: SplashState::Pending(surface),
                subscription: None,
            })),
            ui,
            progress,
        }
    }

    /// Show the splash on the UI thread. Returns whether it is visible.
    /// Repeated calls are no-ops. A failing surface is logged and skipped.
    pub fn show(&self) -> Result<bool, MarshalError> {
        let this = self.clone();
        self.ui.run_on_ui(move || this.show_on_ui())
    }

    pub async fn show_async(&self) -> Result<bool, MarshalError> {
        let this = self.clone();
        self.ui.run_on_ui_async(move || this.show_on_ui()).await
    }

    /// Close and dispose the surface. Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&self) -> Result<bool, MarshalError> {
        let this = self.clone();
        self.ui.run_on_ui(move || this.close_on_ui())
    }

    pub async fn close_async(&self) -> Result<bool, MarshalError> {
        let this = self.clone();
        self.ui.run_on_ui_async(move || this.close_on_ui()).await
    }

    /// Close once `first_render` resolves, or after `limit` regardless.
    pub fn close_after<F>(&self, first_render: F, limit: Duration) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(limit, first_render).await.is_err() {
                tracing::warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "main window did not report first render, closing splash anyway"
                );
            }
            if let Err(e) = this.close_async().await {
                tracing::warn!(error = %e, "could not close splash");
            }
        })
    }

    pub fn is_visible(&self) -> bool {
        matches!(lock(&self.inner).state, SplashState::Visible(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(lock(&self.inner).state, SplashState::Closed)
    }

    fn show_on_ui(&self) -> bool {
        let shown = {
            let mut inner = lock(&self.inner);
            match std::mem::replace(&mut inner.state, SplashState::Skipped) {
                SplashState::Pending(mut surface) => match surface.show() {
                    Ok(()) => {
                        tracing::info!("splash shown");
                        inner.state = SplashState::Visible(surface);
                        true
                    }
                    Err(SplashError::AssetMissing(path)) => {
                        tracing::warn!(asset = %path.display(), "splash asset missing, skipping splash");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "splash could not be shown, skipping splash");
                        false
                    }
                },
                other => {
                    let visible = matches!(other, SplashState::Visible(_));
                    inner.state = other;
                    return visible;
                }
            }
        };

        if shown {
            let inner = Arc::downgrade(&self.inner);
            let id = self.progress.subscribe(move |snapshot| {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if let SplashState::Visible(surface) = &mut lock(&inner).state {
                    surface.update(snapshot);
                };
            });
            lock(&self.inner).subscription = Some(id);
        }
        shown
    }

    fn close_on_ui(&self) -> bool {
        let (state, subscription) = {
            let mut inner = lock(&self.inner);
            if matches!(inner.state, SplashState::Closed) {
                tracing::debug!("splash already closed");
                return false;
            }
            (
                std::mem::replace(&mut inner.state, SplashState::Closed),
                inner.subscription.take(),
            )
        };

        if let Some(id) = subscription {
            self.progress.unsubscribe(id);
        }
        match state {
            SplashState::Visible(mut surface) => {
                surface.close();
                tracing::info!("splash closed");
            }
            SplashState::Pending(_) | SplashState::Skipped => {
                tracing::debug!("splash never shown, marking closed");
            }
            SplashState::Closed => {}
        }
        true
    }
}
