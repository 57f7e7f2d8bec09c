//! Main window hosting: waits for storage, opens the window on the UI
//! thread, and hands the splash its close signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use civic_common::{Notification, StartupError, StartupPhase};
use civic_config::CivicConfig;
use tokio::task::JoinHandle;

use crate::background::StorageReadiness;
use crate::context::StartupContext;
use crate::services::{ResolveError, ServiceProvider, ServiceScope};
use crate::signal::CompletionSignal;
use crate::splash::SplashController;
use crate::ui::{MarshalError, UiDispatcher};
use crate::util::lock;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("main window could not be created: {0}")]
    Create(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// The application's main window. Every method is called on the UI thread.
pub trait MainWindow: Send {
    fn show(&mut self) -> Result<(), WindowError>;

    /// Force a layout pass before activation.
    fn layout(&mut self);

    fn activate(&mut self);

    /// Fulfilled when the first frame has been rendered.
    fn first_render(&self) -> CompletionSignal<()>;

    fn notify(&mut self, notification: Notification);

    /// Close the window and dispose the scope it was created with.
    fn close(&mut self);
}

pub trait WindowFactory: Send + Sync {
    /// Build the window. `scope` belongs to the window for its whole life.
    fn create(
        &self,
        provider: &ServiceProvider,
        scope: ServiceScope,
    ) -> Result<Box<dyn MainWindow>, WindowError>;
}

impl<F> WindowFactory for F
where
    F: Fn(&ServiceProvider, ServiceScope) -> Result<Box<dyn MainWindow>, WindowError>
        + Send
        + Sync,
{
    fn create(
        &self,
        provider: &ServiceProvider,
        scope: ServiceScope,
    ) -> Result<Box<dyn MainWindow>, WindowError> {
        self(provider, scope)
    }
}

#[derive(Debug, Clone)]
pub struct ShellSettings {
    /// How long to wait for storage readiness before opening degraded.
    pub background_wait: Duration,
    /// Open the window even when mandatory storage failed.
    pub allow_degraded: bool,
    /// How long the splash waits for the first render.
    pub first_render_timeout: Duration,
}

impl ShellSettings {
    pub fn from_config(config: &CivicConfig) -> Self {
        Self {
            background_wait: config.startup.background_wait(),
            allow_degraded: config.startup.allow_degraded,
            first_render_timeout: config.startup.first_render_timeout(),
        }
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            background_wait: Duration::from_secs(30),
            allow_degraded: false,
            first_render_timeout: Duration::from_secs(10),
        }
    }
}

/// What the shell started with.
pub struct ShellStart {
    /// Reasons the window opened in degraded mode. Empty when healthy.
    pub degraded: Vec<String>,
    pub first_render: CompletionSignal<()>,
    /// Closes the splash after the first render, when there is a splash.
    pub splash_close: Option<JoinHandle<()>>,
}

type WindowSlot = Arc<Mutex<Option<Box<dyn MainWindow>>>>;

/// Hosts the main window once the process is ready for it.
pub struct HostedApplicationShell {
    settings: ShellSettings,
    factory: Arc<dyn WindowFactory>,
    provider: ServiceProvider,
    ui: UiDispatcher,
    window: WindowSlot,
    started: AtomicBool,
}

impl HostedApplicationShell {
    pub fn new(
        settings: ShellSettings,
        factory: Arc<dyn WindowFactory>,
        provider: ServiceProvider,
        ui: UiDispatcher,
    ) -> Self {
        Self {
            settings,
            factory,
            provider,
            ui,
            window: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    pub fn is_window_open(&self) -> bool {
        lock(&self.window).is_some()
    }

    /// Wait for storage readiness, then create, show, lay out and activate
    /// the main window on the UI thread.
    ///
    /// A fatal storage result aborts before any window exists unless
    /// degraded startup is allowed. Not hearing back within the wait limit
    /// opens the window in degraded mode.
    pub async fn start(
        &self,
        ctx: &StartupContext,
        storage: CompletionSignal<StorageReadiness>,
        splash: Option<&SplashController>,
    ) -> Result<ShellStart, StartupError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartupError::AlreadyStarted("application shell"));
        }
        if let Err(e) = ctx.advance(StartupPhase::ShellStarted, 65, "Checking storage") {
            tracing::warn!(error = %e, "shell started outside the expected phase");
        }

        let mut degraded = Vec::new();
        let limit = self.settings.background_wait;
        let readiness = tokio::select! {
            biased;
            _ = ctx.root().cancelled() => {
                let phase = ctx.phases().current();
                ctx.fail("startup cancelled");
                return Err(StartupError::Cancelled { phase });
            }
            readiness = storage.wait_timeout(limit) => readiness,
        };

        match readiness {
            None => {
                tracing::warn!(
                    wait_secs = limit.as_secs(),
                    "storage readiness unknown, opening in degraded mode"
                );
                degraded.push(format!(
                    "storage was not confirmed within {}s",
                    limit.as_secs()
                ));
            }
            Some(readiness) if readiness.is_fatal() => {
                let reason = readiness
                    .reason
                    .clone()
                    .unwrap_or_else(|| "mandatory storage unavailable".into());
                if !self.settings.allow_degraded {
                    tracing::error!(
                        reason = %reason,
                        correlation_id = %ctx.correlation_id(),
                        "mandatory storage unavailable, not opening the main window"
                    );
                    ctx.fail(format!("storage: {reason}"));
                    return Err(StartupError::Background {
                        causes: vec![reason],
                    });
                }
                tracing::warn!(reason = %reason, "mandatory storage unavailable, degraded startup allowed");
                degraded.push(reason);
            }
            Some(readiness) => {
                tracing::debug!(status = ?readiness.status, "storage readiness confirmed");
            }
        }

        ctx.report(75, "Opening main window");
        let first_render = match self.open_window().await {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!(error = %e, "main window could not be opened");
                ctx.fail(e.to_string());
                return Err(e);
            }
        };
        if let Err(e) = ctx.advance(StartupPhase::WindowShown, 85, "Main window shown") {
            tracing::warn!(error = %e, "could not record window-shown phase");
        }

        let splash_close = splash.map(|splash| {
            let signal = first_render.clone();
            splash.close_after(
                async move {
                    signal.wait().await;
                },
                self.settings.first_render_timeout,
            )
        });

        Ok(ShellStart {
            degraded,
            first_render,
            splash_close,
        })
    }

    /// Open, render and close the main window without the rest of startup.
    pub async fn smoke_test(&self) -> Result<Duration, StartupError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartupError::AlreadyStarted("application shell"));
        }
        let started = tokio::time::Instant::now();
        let first_render = self.open_window().await?;

        let limit = self.settings.first_render_timeout;
        let rendered = first_render.wait_timeout(limit).await.is_some();
        self.shutdown().await?;

        if !rendered {
            return Err(StartupError::Window(format!(
                "no first render within {}s",
                limit.as_secs()
            )));
        }
        let elapsed = started.elapsed();
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "smoke test passed");
        Ok(elapsed)
    }

    /// Show a notification in the main window. Dropped with a debug log when
    /// no window is open.
    pub fn notify(&self, notification: Notification) -> Result<(), MarshalError> {
        let slot = self.window.clone();
        self.ui.post(move || match lock(&slot).as_mut() {
            Some(window) => window.notify(notification),
            None => tracing::debug!(title = %notification.title, "no window, notification dropped"),
        })
    }

    /// Close the main window on the UI thread. `true` if a window was open.
    pub async fn shutdown(&self) -> Result<bool, MarshalError> {
        let slot = self.window.clone();
        self.ui
            .run_on_ui_async(move || {
                let window = lock(&slot).take();
                match window {
                    Some(mut window) => {
                        window.close();
                        tracing::info!("main window closed");
                        true
                    }
                    None => false,
                }
            })
            .await
    }

    async fn open_window(&self) -> Result<CompletionSignal<()>, StartupError> {
        let factory = self.factory.clone();
        let provider = self.provider.clone();
        let slot = self.window.clone();

        let opened = self
            .ui
            .run_on_ui_async(move || -> Result<CompletionSignal<()>, WindowError> {
                let scope = provider.create_scope("main-window");
                let mut window = factory.create(&provider, scope)?;
                if let Err(e) = window.show() {
                    window.close();
                    return Err(e);
                }
                window.layout();
                window.activate();
                let first_render = window.first_render();
                *lock(&slot) = Some(window);
                tracing::info!("main window shown");
                Ok(first_render)
            })
            .await?;
        opened.map_err(|e| StartupError::Window(e.to_string()))
    }
}
