//! Runs the startup phases in order and hands back a running application.

use std::sync::Arc;
use std::time::Duration;

use civic_common::{Notification, StartupError, StartupEvent, StartupPhase};
use civic_config::schema::SplashConfig;
use tokio::task::JoinHandle;

use crate::background::{BackgroundInitializationCoordinator, BackgroundInitializationResult};
use crate::composer::{ApplicationComposer, Composition};
use crate::context::StartupContext;
use crate::parallel::{ParallelOperation, ParallelStartupService};
use crate::shell::{HostedApplicationShell, ShellSettings, WindowFactory};
use crate::splash::{SplashController, SplashSurface};
use crate::tasks::{RegistrationError, StartupTaskRegistry};

/// Everything application-specific the orchestrator needs.
pub trait StartupPlan: Send + Sync {
    /// A composer with every service module added.
    fn composer(&self) -> ApplicationComposer;

    /// `None` runs without a splash. Only called when the splash is enabled.
    fn splash_surface(&self, settings: &SplashConfig) -> Option<Box<dyn SplashSurface>>;

    fn register_tasks(
        &self,
        registry: &mut StartupTaskRegistry,
        composition: &Composition,
    ) -> Result<(), RegistrationError>;

    /// Independent bootstrap work run before the ordered tasks.
    fn parallel_operations(&self, _composition: &Composition) -> Vec<ParallelOperation> {
        Vec::new()
    }

    fn background(&self, composition: &Composition) -> BackgroundInitializationCoordinator;

    fn window_factory(&self, composition: &Composition) -> Arc<dyn WindowFactory>;
}

/// Startup ended before the application was ready.
#[derive(Debug, thiserror::Error)]
#[error("startup failed during {phase_reached}: {error}")]
pub struct StartupFailure {
    /// Last phase entered before failing.
    pub phase_reached: StartupPhase,
    #[source]
    pub error: StartupError,
}

impl StartupFailure {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

/// The application after a successful startup.
pub struct RunningApplication {
    ctx: StartupContext,
    composition: Composition,
    shell: Arc<HostedApplicationShell>,
    background: Arc<BackgroundInitializationCoordinator>,
    health_task: Option<JoinHandle<()>>,
    splash_close: Option<JoinHandle<()>>,
    warnings: Vec<String>,
}

impl RunningApplication {
    pub fn context(&self) -> &StartupContext {
        &self.ctx
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn shell(&self) -> &HostedApplicationShell {
        &self.shell
    }

    /// Everything that put the application in degraded mode.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn background_result(&self) -> Option<Arc<BackgroundInitializationResult>> {
        self.background.completion().get()
    }

    /// Stop background work and close the main window.
    pub async fn shutdown(mut self) -> Result<(), StartupError> {
        tracing::info!(correlation_id = %self.ctx.correlation_id(), "shutting down");
        self.ctx.events().publish(StartupEvent::Shutdown);
        self.ctx.cancel();

        if let Some(task) = self.health_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "health task ended abnormally");
            }
        }
        if let Some(task) = self.splash_close.take() {
            task.abort();
        }
        self.shell.shutdown().await?;
        Ok(())
    }
}

/// Components created so far, cleaned up if a later phase fails.
#[derive(Default)]
struct Stage {
    splash: Option<SplashController>,
    shell: Option<Arc<HostedApplicationShell>>,
}

/// Drives the whole startup sequence.
pub struct StartupOrchestrator {
    plan: Arc<dyn StartupPlan>,
}

impl StartupOrchestrator {
    pub fn new(plan: Arc<dyn StartupPlan>) -> Self {
        Self { plan }
    }

    /// Splash, composition, parallel bootstrap, ordered tasks, background
    /// initialization and the main window, in that order.
    pub async fn run(&self, ctx: &StartupContext) -> Result<RunningApplication, StartupFailure> {
        let mut stage = Stage::default();
        match self.run_phases(ctx, &mut stage).await {
            Ok(app) => Ok(app),
            Err(error) => Err(self.abort(ctx, stage, error).await),
        }
    }

    /// Compose, then open, render and close the main window. No splash, no
    /// tasks, no background work.
    pub async fn smoke_test(&self, ctx: &StartupContext) -> Result<Duration, StartupFailure> {
        let outcome = async {
            let composer = self.plan.composer();
            let composition = tokio::task::spawn_blocking(move || composer.compose())
                .await
                .map_err(|e| StartupError::Io(e.into()))??;
            let settings = ShellSettings::from_config(composition.settings());
            let shell = HostedApplicationShell::new(
                settings,
                self.plan.window_factory(&composition),
                composition.provider.clone(),
                ctx.ui().clone(),
            );
            shell.smoke_test().await
        }
        .await;

        outcome.map_err(|error| {
            tracing::error!(error = %error, "smoke test failed");
            StartupFailure {
                phase_reached: ctx.phases().current(),
                error,
            }
        })
    }

    async fn run_phases(
        &self,
        ctx: &StartupContext,
        stage: &mut Stage,
    ) -> Result<RunningApplication, StartupError> {
        ctx.report(0, "Starting");
        tracing::info!(correlation_id = %ctx.correlation_id(), "startup began");

        // Configuration first: the splash is configured by it.
        let mut composer = self.plan.composer();
        let (composer, splash_config) = tokio::task::spawn_blocking(move || {
            let loaded = composer.load_config().map(|c| c.config().splash.clone());
            (composer, loaded)
        })
        .await
        .map_err(|e| StartupError::Io(e.into()))?;
        let splash_config = splash_config?;

        let mut splash_shown = false;
        if splash_config.enabled {
            if let Some(surface) = self.plan.splash_surface(&splash_config) {
                let splash = SplashController::new(surface, ctx.ui().clone(), ctx.progress().clone());
                splash_shown = splash.show_async().await?;
                stage.splash = Some(splash);
            }
        }
        if splash_shown {
            advance(ctx, StartupPhase::SplashShown, 10, "Composing services");
        } else {
            ctx.report(10, "Composing services");
        }

        let composition = tokio::task::spawn_blocking(move || composer.compose())
            .await
            .map_err(|e| StartupError::Io(e.into()))??;
        advance(ctx, StartupPhase::Composed, 20, "Services ready");
        let settings = composition.settings().clone();
        let mut warnings = Vec::new();

        // Independent bootstrap work.
        let operations = self.plan.parallel_operations(&composition);
        if !operations.is_empty() {
            ctx.report(22, "Preparing workspace");
            let service = ParallelStartupService::new(settings.parallel.max_concurrency as usize)
                .with_default_timeout(settings.parallel.operation_timeout());
            let report = service.run(ctx.root(), operations).await;
            if ctx.root().is_cancelled() {
                return Err(StartupError::Cancelled {
                    phase: ctx.phases().current(),
                });
            }
            if let Some(failed) = report.fatal_failure() {
                return Err(StartupError::FatalTask {
                    task: failed.name.clone(),
                    phase: ctx.phases().current(),
                    reason: failed.status.to_string(),
                });
            }
            for failed in report.failures() {
                warnings.push(format!("{}: {}", failed.name, failed.status));
            }
        }

        // Ordered tasks.
        let mut registry = StartupTaskRegistry::new();
        self.plan
            .register_tasks(&mut registry, &composition)
            .map_err(|e| StartupError::Composition(vec![e.to_string()]))?;
        let runner = registry
            .default_timeout(settings.startup.default_task_timeout())
            .freeze();
        let report = runner.run(ctx, &composition.provider).await?;
        warnings.extend(
            report
                .warnings
                .iter()
                .map(|w| format!("{}: {}", w.task, w.reason)),
        );

        // Background initialization runs alongside the shell, which only
        // waits for the storage part.
        let background = Arc::new(self.plan.background(&composition));
        background.start(ctx)?;

        let shell = Arc::new(HostedApplicationShell::new(
            ShellSettings::from_config(&settings),
            self.plan.window_factory(&composition),
            composition.provider.clone(),
            ctx.ui().clone(),
        ));
        stage.shell = Some(shell.clone());
        let started = shell
            .start(ctx, background.storage_ready(), stage.splash.as_ref())
            .await?;
        warnings.extend(started.degraded);

        // A critical background failure may already have failed startup;
        // its result carries the causes.
        advance(ctx, StartupPhase::BackgroundInit, 90, "Finishing background checks");
        let result = tokio::select! {
            biased;
            _ = ctx.root().cancelled() => {
                return Err(StartupError::Cancelled { phase: ctx.phases().current() });
            }
            result = background.wait() => result,
        };
        if let Some(failure) = &result.fatal {
            return Err(failure.clone().into());
        }
        warnings.extend(result.warnings.iter().cloned());

        if !warnings.is_empty() {
            tracing::warn!(warnings = ?warnings, "starting in degraded mode");
            ctx.events().publish(StartupEvent::DegradedMode {
                reasons: warnings.clone(),
            });
            for warning in &warnings {
                if let Err(e) = shell.notify(Notification::degraded(warning.clone())) {
                    tracing::warn!(error = %e, "degraded notice not delivered");
                }
            }
        }

        advance(ctx, StartupPhase::Ready, 100, "Ready");

        let health_task = match background.health() {
            Some(health) if settings.health.enabled => Some(
                health
                    .clone()
                    .spawn_periodic(settings.health.interval(), ctx.root().child_token()),
            ),
            _ => None,
        };

        tracing::info!(
            degraded = !warnings.is_empty(),
            correlation_id = %ctx.correlation_id(),
            "startup complete"
        );
        Ok(RunningApplication {
            ctx: ctx.clone(),
            composition,
            shell,
            background,
            health_task,
            splash_close: started.splash_close,
            warnings,
        })
    }

    async fn abort(&self, ctx: &StartupContext, stage: Stage, error: StartupError) -> StartupFailure {
        ctx.fail(error.to_string());
        let phase_reached = ctx
            .phases()
            .failure()
            .map_or_else(|| ctx.phases().current(), |f| f.from);
        tracing::error!(
            phase = %phase_reached,
            error = %error,
            correlation_id = %ctx.correlation_id(),
            "startup aborted"
        );

        ctx.cancel();
        if let Some(shell) = stage.shell {
            if let Err(e) = shell.shutdown().await {
                tracing::warn!(error = %e, "main window not closed");
            }
        }
        if let Some(splash) = stage.splash {
            if let Err(e) = splash.close_async().await {
                tracing::warn!(error = %e, "splash not closed");
            }
        }
        StartupFailure {
            phase_reached,
            error,
        }
    }
}

fn advance(ctx: &StartupContext, phase: StartupPhase, percentage: u8, message: &str) {
    if let Err(e) = ctx.advance(phase, percentage, message) {
        tracing::warn!(error = %e, phase = %phase, "phase not entered");
    }
}
