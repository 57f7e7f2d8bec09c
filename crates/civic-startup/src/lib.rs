//! Phased startup for the Civic desktop application.
//!
//! A [`StartupOrchestrator`] takes the process from bootstrap to a ready main
//! window: splash, configuration and service composition, ordered startup
//! tasks, the hosted main window, then deferred background initialization.
//! Everything that touches the UI goes through a [`ui::UiDispatcher`].

pub mod background;
pub mod composer;
pub mod context;
pub mod diagnostics;
pub mod health;
pub mod orchestrator;
pub mod parallel;
pub mod phase;
pub mod progress;
pub mod services;
pub mod shell;
pub mod signal;
pub mod splash;
pub mod tasks;
pub mod ui;

mod util;

pub use background::{
    BackgroundInitializationCoordinator, BackgroundInitializationResult, BackgroundSettings,
    CheckStatus, StorageProbe, StorageReadiness, TelemetryWarmup,
};
pub use composer::{module_fn, ApplicationComposer, Composition, ServiceModule};
pub use context::StartupContext;
pub use health::{HealthCheckCoordinator, HealthProbe, HealthSnapshot};
pub use orchestrator::{RunningApplication, StartupFailure, StartupOrchestrator, StartupPlan};
pub use parallel::{ParallelOperation, ParallelReport, ParallelStartupService};
pub use phase::PhaseTracker;
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use shell::{HostedApplicationShell, MainWindow, ShellSettings, WindowError, WindowFactory};
pub use signal::CompletionSignal;
pub use splash::{SplashController, SplashError, SplashSurface};
