//! The Civic application's startup plan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use civic_common::EventBus;
use civic_config::layered::ENV_PREFIX;
use civic_config::schema::SplashConfig;
use civic_config::{ConfigBuilder, ENVIRONMENT_VAR};
use civic_startup::diagnostics::LogControl;
use civic_startup::services::{ServiceProvider, ServiceScope};
use civic_startup::tasks::{RegistrationError, StartupTaskRegistry};
use civic_startup::ui::UiDispatcher;
use civic_startup::{
    ApplicationComposer, BackgroundInitializationCoordinator, BackgroundSettings, Composition,
    HealthCheckCoordinator, MainWindow, ParallelOperation, SplashSurface, StartupContext,
    StartupPlan, WindowError, WindowFactory,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{operations, tasks};
use crate::checks::{
    CollectorWarmup, DirectoryWritable, DiskSpaceMarker, FileStorageProbe, StorageLatency,
};
use crate::cli::Args;
use crate::console::{Console, ConsoleSplash, ConsoleWindow};
use crate::paths::AppPaths;
use crate::services::{core_module, dashboard_module, ReportTemplates};

const STORAGE_LATENCY_LIMIT: Duration = Duration::from_millis(250);

/// Command-line choices that shape configuration loading.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub config_path: Option<PathBuf>,
    pub environment: Option<String>,
    pub allow_degraded: bool,
}

impl PlanOptions {
    pub fn from_args(args: &Args) -> Self {
        Self {
            config_path: args.config.clone(),
            environment: args
                .environment
                .clone()
                .or_else(|| std::env::var(ENVIRONMENT_VAR).ok()),
            allow_degraded: args.allow_degraded,
        }
    }

    /// Base file, environment overlay, process environment and the
    /// `--allow-degraded` override on top.
    pub fn config_builder(&self) -> ConfigBuilder {
        let builder = match &self.config_path {
            Some(path) => ConfigBuilder::new().base_file(path),
            None => match civic_config::toml_loader::default_config_path() {
                Ok(path) => ConfigBuilder::new().base_file(path).create_if_missing(true),
                Err(e) => {
                    tracing::warn!(error = %e, "no config directory, using defaults");
                    ConfigBuilder::new()
                }
            },
        };
        let builder = builder.environment(self.environment.clone());
        if self.allow_degraded {
            let forced = (
                format!("{ENV_PREFIX}STARTUP__ALLOW_DEGRADED"),
                "true".to_string(),
            );
            builder.env_vars(std::env::vars().chain(std::iter::once(forced)))
        } else {
            builder
        }
    }
}

pub struct CivicPlan {
    options: PlanOptions,
    ui: UiDispatcher,
    root: CancellationToken,
    events: EventBus,
    runtime: Handle,
    log_control: LogControl,
    window_console: Console,
    splash_console: Console,
}

impl CivicPlan {
    pub fn new(options: PlanOptions, ctx: &StartupContext, runtime: Handle, log_control: LogControl) -> Self {
        Self {
            options,
            ui: ctx.ui().clone(),
            root: ctx.root().clone(),
            events: ctx.events().clone(),
            runtime,
            log_control,
            window_console: Console::stdout(),
            splash_console: Console::stderr(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_consoles(mut self, window: Console, splash: Console) -> Self {
        self.window_console = window;
        self.splash_console = splash;
        self
    }
}

impl StartupPlan for CivicPlan {
    fn composer(&self) -> ApplicationComposer {
        ApplicationComposer::new(self.options.config_builder())
            .log_control(self.log_control.clone())
            .module(core_module())
            .module(dashboard_module(self.ui.clone(), self.root.clone()))
    }

    fn splash_surface(&self, settings: &SplashConfig) -> Option<Box<dyn SplashSurface>> {
        Some(Box::new(ConsoleSplash::new(
            settings,
            self.splash_console.clone(),
        )))
    }

    fn register_tasks(
        &self,
        registry: &mut StartupTaskRegistry,
        _composition: &Composition,
    ) -> Result<(), RegistrationError> {
        tasks::register(registry)
    }

    fn parallel_operations(&self, composition: &Composition) -> Vec<ParallelOperation> {
        let provider = &composition.provider;
        match (
            provider.resolve::<AppPaths>(),
            provider.resolve::<ReportTemplates>(),
        ) {
            (Ok(paths), Ok(templates)) => operations::operations(paths, templates),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "bootstrap services missing");
                Vec::new()
            }
        }
    }

    fn background(&self, composition: &Composition) -> BackgroundInitializationCoordinator {
        let settings = composition.settings();
        let paths = composition
            .provider
            .resolve::<AppPaths>()
            .unwrap_or_else(|_| Arc::new(AppPaths::from_config(settings)));

        let mut coordinator =
            BackgroundInitializationCoordinator::new(BackgroundSettings::from_config(settings))
                .with_storage(Arc::new(FileStorageProbe::new(
                    paths.data_dir(),
                    paths.schema_file(),
                    settings.storage.schema_version,
                )));

        if settings.health.enabled {
            let health = HealthCheckCoordinator::new(settings.health.probe_timeout())
                .with_events(self.events.clone())
                .with_probe(DiskSpaceMarker::new(paths.data_dir()))
                .with_probe(DirectoryWritable::new("log-dir", paths.log_dir()))
                .with_probe(StorageLatency::new(paths.data_dir(), STORAGE_LATENCY_LIMIT));
            coordinator = coordinator.with_health(Arc::new(health));
        }

        let telemetry = &settings.telemetry;
        if telemetry.enabled && !telemetry.endpoint.trim().is_empty() {
            match CollectorWarmup::new(&telemetry.endpoint) {
                Ok(warmup) => coordinator = coordinator.with_telemetry(Arc::new(warmup)),
                Err(e) => tracing::warn!(error = %e, "telemetry disabled"),
            }
        }
        coordinator
    }

    fn window_factory(&self, _composition: &Composition) -> Arc<dyn WindowFactory> {
        let console = self.window_console.clone();
        let runtime = self.runtime.clone();
        Arc::new(
            move |_: &ServiceProvider,
                  scope: ServiceScope|
                  -> Result<Box<dyn MainWindow>, WindowError> {
                Ok(Box::new(ConsoleWindow::open(
                    scope,
                    console.clone(),
                    runtime.clone(),
                )?))
            },
        )
    }
}

#[cfg(test)]
mod tests;
