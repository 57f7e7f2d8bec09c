//! Deferred initialization that continues after the main window is up.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use civic_common::StartupError;
use civic_config::CivicConfig;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::StartupContext;
use crate::health::{HealthCheckCoordinator, HealthSnapshot};
use crate::signal::CompletionSignal;
use crate::util::{catch_panic, panic_message};

/// Checks the application database (or file store) the UI depends on.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn is_reachable(&self) -> Result<(), String>;

    /// Whether the store's schema can be opened by this build.
    async fn validate_schema(&self) -> Result<(), String>;
}

#[async_trait]
pub trait TelemetryWarmup: Send + Sync {
    async fn warm_up(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    NotRun,
    Passed,
    Failed,
    /// Not configured.
    Skipped,
}

/// Every fatal cause observed during background initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundFailure {
    pub causes: Vec<String>,
}

impl fmt::Display for BackgroundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.causes.join("; "))
    }
}

impl From<BackgroundFailure> for StartupError {
    fn from(failure: BackgroundFailure) -> Self {
        StartupError::Background {
            causes: failure.causes,
        }
    }
}

/// The storage part of background initialization, published as soon as it
/// is known so the shell does not wait for health and telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReadiness {
    pub status: CheckStatus,
    pub mandatory: bool,
    pub reason: Option<String>,
}

impl StorageReadiness {
    /// Mandatory storage that failed its checks.
    pub fn is_fatal(&self) -> bool {
        self.mandatory && self.status == CheckStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundInitializationResult {
    pub storage: CheckStatus,
    pub health: CheckStatus,
    pub telemetry: CheckStatus,
    /// Non-fatal problems, shown to the user as degraded-mode notices.
    pub warnings: Vec<String>,
    pub fatal: Option<BackgroundFailure>,
    pub health_snapshot: Option<Arc<HealthSnapshot>>,
}

impl BackgroundInitializationResult {
    fn not_run() -> Self {
        Self {
            storage: CheckStatus::NotRun,
            health: CheckStatus::NotRun,
            telemetry: CheckStatus::NotRun,
            warnings: Vec::new(),
            fatal: None,
            health_snapshot: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundSettings {
    pub storage_mandatory: bool,
    pub storage_timeout: Duration,
    pub telemetry_timeout: Duration,
    /// Downgrade a mandatory storage failure to a warning.
    pub allow_degraded: bool,
}

impl BackgroundSettings {
    pub fn from_config(config: &CivicConfig) -> Self {
        Self {
            storage_mandatory: config.storage.mandatory,
            storage_timeout: config.storage.probe_timeout(),
            telemetry_timeout: config.telemetry.warmup_timeout(),
            allow_degraded: config.startup.allow_degraded,
        }
    }
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            storage_mandatory: true,
            storage_timeout: Duration::from_secs(5),
            telemetry_timeout: Duration::from_secs(3),
            allow_degraded: false,
        }
    }
}

/// Runs storage checks, health probes and telemetry warm-up once, in that
/// order, on a background task.
pub struct BackgroundInitializationCoordinator {
    settings: BackgroundSettings,
    storage: Option<Arc<dyn StorageProbe>>,
    health: Option<Arc<HealthCheckCoordinator>>,
    telemetry: Option<Arc<dyn TelemetryWarmup>>,
    started: AtomicBool,
    storage_ready: CompletionSignal<StorageReadiness>,
    completion: CompletionSignal<BackgroundInitializationResult>,
}

impl BackgroundInitializationCoordinator {
    pub fn new(settings: BackgroundSettings) -> Self {
        Self {
            settings,
            storage: None,
            health: None,
            telemetry: None,
            started: AtomicBool::new(false),
            storage_ready: CompletionSignal::new(),
            completion: CompletionSignal::new(),
        }
    }

    pub fn with_storage(mut self, probe: Arc<dyn StorageProbe>) -> Self {
        self.storage = Some(probe);
        self
    }

    pub fn with_health(mut self, health: Arc<HealthCheckCoordinator>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryWarmup>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn settings(&self) -> &BackgroundSettings {
        &self.settings
    }

    pub fn health(&self) -> Option<&Arc<HealthCheckCoordinator>> {
        self.health.as_ref()
    }

    /// Fulfilled once the storage checks finish (or are skipped).
    pub fn storage_ready(&self) -> CompletionSignal<StorageReadiness> {
        self.storage_ready.clone()
    }

    /// Fulfilled once with the full result, whatever happens.
    pub fn completion(&self) -> CompletionSignal<BackgroundInitializationResult> {
        self.completion.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) -> Arc<BackgroundInitializationResult> {
        self.completion.wait().await
    }

    /// Start the background sequence. Only the first call does anything.
    pub fn start(self: &Arc<Self>, ctx: &StartupContext) -> Result<JoinHandle<()>, StartupError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartupError::AlreadyStarted("background initialization"));
        }

        let this = self.clone();
        let ctx = ctx.clone();
        Ok(tokio::spawn(async move {
            let token = ctx.root().child_token();
            let started = Instant::now();
            tracing::info!(correlation_id = %ctx.correlation_id(), "background initialization started");

            let result = match AssertUnwindSafe(this.initialize(&token)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let reason = format!(
                        "background initialization panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    let _ = this.storage_ready.complete(StorageReadiness {
                        status: CheckStatus::Failed,
                        mandatory: this.settings.storage_mandatory,
                        reason: Some(reason.clone()),
                    });
                    BackgroundInitializationResult {
                        fatal: Some(BackgroundFailure {
                            causes: vec![reason],
                        }),
                        ..BackgroundInitializationResult::not_run()
                    }
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result.fatal {
                Some(failure) => {
                    tracing::error!(
                        causes = %failure,
                        elapsed_ms,
                        correlation_id = %ctx.correlation_id(),
                        "background initialization failed"
                    );
                    ctx.fail(format!("background initialization: {failure}"));
                }
                None => tracing::info!(
                    storage = ?result.storage,
                    health = ?result.health,
                    telemetry = ?result.telemetry,
                    warnings = result.warnings.len(),
                    elapsed_ms,
                    "background initialization finished"
                ),
            }

            if this.completion.complete(result).is_err() {
                tracing::debug!("background result was already published");
            }
        }))
    }

    async fn initialize(&self, token: &CancellationToken) -> BackgroundInitializationResult {
        let mut result = BackgroundInitializationResult::not_run();
        let mut causes = Vec::new();

        // Storage
        let readiness = match &self.storage {
            None => StorageReadiness {
                status: CheckStatus::Skipped,
                mandatory: self.settings.storage_mandatory,
                reason: None,
            },
            Some(probe) => match cancellable(token, self.check_storage(probe.as_ref())).await {
                None => return self.cancelled(result),
                Some(Ok(())) => StorageReadiness {
                    status: CheckStatus::Passed,
                    mandatory: self.settings.storage_mandatory,
                    reason: None,
                },
                Some(Err(reason)) => StorageReadiness {
                    status: CheckStatus::Failed,
                    mandatory: self.settings.storage_mandatory,
                    reason: Some(reason),
                },
            },
        };
        result.storage = readiness.status;
        if let Some(reason) = &readiness.reason {
            if readiness.is_fatal() && !self.settings.allow_degraded {
                tracing::error!(reason = %reason, "mandatory storage check failed");
                causes.push(reason.clone());
            } else {
                tracing::warn!(reason = %reason, mandatory = readiness.mandatory, "storage check failed");
                result.warnings.push(reason.clone());
            }
        }
        if self.storage_ready.complete(readiness).is_err() {
            tracing::debug!("storage readiness was already published");
        }

        // Health probes
        if let Some(health) = &self.health {
            let Some(snapshot) = cancellable(token, health.run_once()).await else {
                return self.cancelled(result);
            };
            result.health = if snapshot.is_healthy() {
                CheckStatus::Passed
            } else {
                CheckStatus::Failed
            };
            for (name, outcome) in snapshot.failing() {
                let detail = outcome.detail.as_deref().unwrap_or("failed");
                let message = format!("health probe '{name}' failed: {detail}");
                if outcome.critical {
                    causes.push(message);
                } else {
                    result.warnings.push(message);
                }
            }
            result.health_snapshot = Some(snapshot);
        } else {
            result.health = CheckStatus::Skipped;
        }

        // Telemetry
        if let Some(telemetry) = &self.telemetry {
            let limit = self.settings.telemetry_timeout;
            let warm_up = tokio::time::timeout(limit, catch_panic(telemetry.warm_up()));
            let Some(outcome) = cancellable(token, warm_up).await else {
                return self.cancelled(result);
            };
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(reason)) => Some(reason),
                Err(_) => Some(format!("timed out after {}ms", limit.as_millis())),
            };
            result.telemetry = match failure {
                None => CheckStatus::Passed,
                Some(reason) => {
                    tracing::warn!(reason = %reason, "telemetry warm-up failed");
                    result.warnings.push(format!("telemetry unavailable: {reason}"));
                    CheckStatus::Failed
                }
            };
        } else {
            result.telemetry = CheckStatus::Skipped;
        }

        if !causes.is_empty() {
            result.fatal = Some(BackgroundFailure { causes });
        }
        result
    }

    async fn check_storage(&self, probe: &dyn StorageProbe) -> Result<(), String> {
        let limit = self.settings.storage_timeout;
        let checks = catch_panic(async {
            probe
                .is_reachable()
                .await
                .map_err(|e| format!("storage unreachable: {e}"))?;
            probe
                .validate_schema()
                .await
                .map_err(|e| format!("storage schema incompatible: {e}"))
        });
        match tokio::time::timeout(limit, checks).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "storage check timed out after {}ms",
                limit.as_millis()
            )),
        }
    }

    fn cancelled(&self, mut result: BackgroundInitializationResult) -> BackgroundInitializationResult {
        tracing::info!("background initialization cancelled");
        let _ = self.storage_ready.complete(StorageReadiness {
            status: CheckStatus::NotRun,
            mandatory: self.settings.storage_mandatory,
            reason: Some("cancelled".into()),
        });
        result.warnings.push("background initialization cancelled".into());
        result
    }
}

async fn cancellable<F: Future>(token: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthProbe;
    use crate::ui::{UiLoop, UiThread};
    use civic_common::StartupPhase;

    struct Storage {
        reachable: Result<(), &'static str>,
        schema: Result<(), &'static str>,
        delay: Duration,
    }

    impl Storage {
        fn healthy() -> Self {
            Self {
                reachable: Ok(()),
                schema: Ok(()),
                delay: Duration::ZERO,
            }
        }

        fn unreachable() -> Self {
            Self {
                reachable: Err("connection refused"),
                ..Self::healthy()
            }
        }
    }

    #[async_trait]
    impl StorageProbe for Storage {
        async fn is_reachable(&self) -> Result<(), String> {
            tokio::time::sleep(self.delay).await;
            self.reachable.map_err(String::from)
        }

        async fn validate_schema(&self) -> Result<(), String> {
            self.schema.map_err(String::from)
        }
    }

    struct Telemetry(Result<(), &'static str>);

    #[async_trait]
    impl TelemetryWarmup for Telemetry {
        async fn warm_up(&self) -> Result<(), String> {
            self.0.map_err(String::from)
        }
    }

    struct CriticalProbe;

    #[async_trait]
    impl HealthProbe for CriticalProbe {
        fn name(&self) -> &str {
            "ledger-db"
        }

        fn critical(&self) -> bool {
            true
        }

        async fn check(&self) -> Result<(), String> {
            Err("no connection".into())
        }
    }

    fn harness() -> (UiThread, StartupContext) {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let ctx = StartupContext::new(ui.dispatcher());
        (ui, ctx)
    }

    #[tokio::test]
    async fn everything_passes() {
        let (_ui, ctx) = harness();
        let health = Arc::new(HealthCheckCoordinator::new(Duration::from_secs(1)));
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(BackgroundSettings::default())
                .with_storage(Arc::new(Storage::healthy()))
                .with_health(health)
                .with_telemetry(Arc::new(Telemetry(Ok(())))),
        );

        background.start(&ctx).unwrap();
        let readiness = background.storage_ready().wait().await;
        assert_eq!(readiness.status, CheckStatus::Passed);

        let result = background.wait().await;
        assert_eq!(result.storage, CheckStatus::Passed);
        assert_eq!(result.health, CheckStatus::Passed);
        assert_eq!(result.telemetry, CheckStatus::Passed);
        assert!(!result.is_fatal());
        assert!(!result.is_degraded());
        assert_eq!(result.health_snapshot.as_ref().unwrap().generation, 1);
        assert!(!ctx.phases().is_failed());
    }

    #[tokio::test]
    async fn mandatory_storage_failure_is_fatal() {
        let (_ui, ctx) = harness();
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(BackgroundSettings::default())
                .with_storage(Arc::new(Storage::unreachable())),
        );

        background.start(&ctx).unwrap();
        let readiness = background.storage_ready().wait().await;
        assert!(readiness.is_fatal());
        assert!(readiness.reason.as_deref().unwrap().contains("connection refused"));

        let result = background.wait().await;
        let failure = result.fatal.as_ref().unwrap();
        assert_eq!(failure.causes.len(), 1);
        assert_eq!(result.health, CheckStatus::Skipped);
        assert_eq!(result.telemetry, CheckStatus::Skipped);
        assert_eq!(ctx.phases().current(), StartupPhase::Failed);

        let err: StartupError = failure.clone().into();
        assert!(err.to_string().contains("storage unreachable"));
    }

    #[tokio::test]
    async fn optional_storage_and_telemetry_failures_are_warnings() {
        let (_ui, ctx) = harness();
        let settings = BackgroundSettings {
            storage_mandatory: false,
            ..BackgroundSettings::default()
        };
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(settings)
                .with_storage(Arc::new(Storage {
                    schema: Err("version 2, expected 3"),
                    ..Storage::healthy()
                }))
                .with_telemetry(Arc::new(Telemetry(Err("endpoint offline")))),
        );

        background.start(&ctx).unwrap();
        let result = background.wait().await;

        assert!(!result.is_fatal());
        assert_eq!(result.storage, CheckStatus::Failed);
        assert_eq!(result.telemetry, CheckStatus::Failed);
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("schema incompatible"));
        assert!(!background.storage_ready().get().unwrap().is_fatal());
        assert!(!ctx.phases().is_failed());
    }

    #[tokio::test]
    async fn allow_degraded_downgrades_mandatory_storage() {
        let (_ui, ctx) = harness();
        let settings = BackgroundSettings {
            allow_degraded: true,
            ..BackgroundSettings::default()
        };
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(settings)
                .with_storage(Arc::new(Storage::unreachable())),
        );

        background.start(&ctx).unwrap();
        let result = background.wait().await;
        assert!(!result.is_fatal());
        assert!(result.is_degraded());
        // The readiness itself still says the mandatory store is down.
        assert!(background.storage_ready().get().unwrap().is_fatal());
    }

    #[tokio::test]
    async fn every_fatal_cause_is_aggregated() {
        let (_ui, ctx) = harness();
        let health = Arc::new(
            HealthCheckCoordinator::new(Duration::from_secs(1)).with_probe(CriticalProbe),
        );
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(BackgroundSettings::default())
                .with_storage(Arc::new(Storage::unreachable()))
                .with_health(health),
        );

        background.start(&ctx).unwrap();
        let result = background.wait().await;
        let causes = &result.fatal.as_ref().unwrap().causes;
        assert_eq!(causes.len(), 2);
        assert!(causes[1].contains("ledger-db"));
        assert_eq!(result.health, CheckStatus::Failed);
        assert_eq!(ctx.phases().history().iter().filter(|p| p.is_terminal()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storage_times_out() {
        let (_ui, ctx) = harness();
        let settings = BackgroundSettings {
            storage_timeout: Duration::from_secs(2),
            ..BackgroundSettings::default()
        };
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(settings).with_storage(Arc::new(Storage {
                delay: Duration::from_secs(60),
                ..Storage::healthy()
            })),
        );

        background.start(&ctx).unwrap();
        let readiness = background.storage_ready().wait().await;
        assert!(readiness.is_fatal());
        assert!(readiness.reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (_ui, ctx) = harness();
        let background = Arc::new(BackgroundInitializationCoordinator::new(
            BackgroundSettings::default(),
        ));
        background.start(&ctx).unwrap().await.unwrap();
        assert!(matches!(
            background.start(&ctx),
            Err(StartupError::AlreadyStarted(_))
        ));
        let result = background.completion().get().unwrap();
        assert_eq!(result.storage, CheckStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_still_completes_both_signals() {
        let (_ui, ctx) = harness();
        let background = Arc::new(
            BackgroundInitializationCoordinator::new(BackgroundSettings {
                storage_timeout: Duration::from_secs(600),
                ..BackgroundSettings::default()
            })
            .with_storage(Arc::new(Storage {
                delay: Duration::from_secs(300),
                ..Storage::healthy()
            })),
        );

        let handle = background.start(&ctx).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();
        handle.await.unwrap();

        assert_eq!(
            background.storage_ready().get().unwrap().status,
            CheckStatus::NotRun
        );
        let result = background.completion().get().unwrap();
        assert!(!result.is_fatal());
        assert_eq!(result.storage, CheckStatus::NotRun);
    }
}
