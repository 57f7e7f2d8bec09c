//! Bounded concurrent startup operations.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::util::{catch_panic, panic_message};

type OperationBody =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), String>> + Send>;
type CompletionCallback = Box<dyn FnOnce(&OperationResult) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl OperationStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, OperationStatus::Failed(_) | OperationStatus::TimedOut)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Succeeded => f.write_str("succeeded"),
            OperationStatus::Failed(reason) => write!(f, "failed: {reason}"),
            OperationStatus::TimedOut => f.write_str("timed out"),
            OperationStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub name: String,
    pub status: OperationStatus,
    pub fail_fast: bool,
    pub elapsed: Duration,
}

/// One unit of independent startup work.
pub struct ParallelOperation {
    name: String,
    fail_fast: bool,
    timeout: Option<Duration>,
    body: OperationBody,
    on_complete: Option<CompletionCallback>,
}

impl ParallelOperation {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            fail_fast: false,
            timeout: None,
            body: Box::new(
                move |token: CancellationToken| -> BoxFuture<'static, Result<(), String>> {
                    Box::pin(body(token))
                },
            ),
            on_complete: None,
        }
    }

    /// Cancel every sibling when this operation fails. Also makes the failure
    /// fatal to startup.
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Invoked exactly once when the operation ends, whatever the outcome.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&OperationResult) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParallelReport {
    /// One entry per operation, in submission order.
    pub results: Vec<OperationResult>,
}

impl ParallelReport {
    pub fn failures(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    /// The first failed fail-fast operation, if any.
    pub fn fatal_failure(&self) -> Option<&OperationResult> {
        self.failures().find(|r| r.fail_fast)
    }

    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status == OperationStatus::Succeeded)
    }
}

/// Runs [`ParallelOperation`]s concurrently up to a fixed limit.
pub struct ParallelStartupService {
    max_concurrency: usize,
    default_timeout: Option<Duration>,
}

impl ParallelStartupService {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            default_timeout: None,
        }
    }

    /// Timeout for operations that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run every operation and collect every outcome. Never fails as a whole;
    /// callers inspect the report.
    pub async fn run(
        &self,
        parent: &CancellationToken,
        operations: Vec<ParallelOperation>,
    ) -> ParallelReport {
        let total = operations.len();
        let limiter = Arc::new(Semaphore::new(self.max_concurrency));
        let group = parent.child_token();
        let mut set = JoinSet::new();

        tracing::info!(
            operations = total,
            max_concurrency = self.max_concurrency,
            "parallel startup began"
        );

        let submitted: Vec<(String, bool)> = operations
            .iter()
            .map(|op| (op.name.clone(), op.fail_fast))
            .collect();
        for (index, op) in operations.into_iter().enumerate() {
            let limiter = limiter.clone();
            let group = group.clone();
            let timeout = op.timeout.or(self.default_timeout);
            set.spawn(async move {
                let result =
                    execute(op.name, op.fail_fast, timeout, op.body, limiter, &group).await;
                if result.status.is_failure() && result.fail_fast && !group.is_cancelled() {
                    tracing::warn!(
                        operation = %result.name,
                        "fail-fast operation failed, cancelling siblings"
                    );
                    group.cancel();
                }
                if let Some(callback) = op.on_complete {
                    let delivered =
                        std::panic::catch_unwind(AssertUnwindSafe(|| callback(&result)));
                    if let Err(payload) = delivered {
                        tracing::error!(
                            operation = %result.name,
                            panic = %panic_message(payload.as_ref()),
                            "completion callback panicked"
                        );
                    }
                }
                (index, result)
            });
        }

        let mut results: Vec<Option<OperationResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "parallel operation task aborted"),
            }
        }

        // An aborted task still gets an entry so a fail-fast failure is never lost.
        let report = ParallelReport {
            results: results
                .into_iter()
                .zip(submitted)
                .map(|(result, (name, fail_fast))| {
                    result.unwrap_or_else(|| OperationResult {
                        name,
                        status: OperationStatus::Failed("operation task aborted".into()),
                        fail_fast,
                        elapsed: Duration::ZERO,
                    })
                })
                .collect(),
        };
        tracing::info!(
            operations = total,
            failed = report.failures().count(),
            "parallel startup finished"
        );
        report
    }
}

async fn execute(
    name: String,
    fail_fast: bool,
    timeout: Option<Duration>,
    body: OperationBody,
    limiter: Arc<Semaphore>,
    group: &CancellationToken,
) -> OperationResult {
    let started = Instant::now();
    let permit = tokio::select! {
        biased;
        _ = group.cancelled() => None,
        permit = limiter.acquire_owned() => permit.ok(),
    };

    let status = match permit {
        None => OperationStatus::Cancelled,
        Some(_permit) => {
            let token = group.child_token();
            let work = catch_panic(body(token.clone()));
            let bounded = async {
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(r) => r.map_err(Some),
                        Err(_) => Err(None),
                    },
                    None => work.await.map_err(Some),
                }
            };
            let status = tokio::select! {
                biased;
                _ = token.cancelled() => OperationStatus::Cancelled,
                outcome = bounded => match outcome {
                    Ok(()) => OperationStatus::Succeeded,
                    Err(Some(reason)) => OperationStatus::Failed(reason),
                    Err(None) => OperationStatus::TimedOut,
                },
            };
            token.cancel();
            status
        }
    };

    let elapsed = started.elapsed();
    match &status {
        OperationStatus::Succeeded => {
            let elapsed_ms = elapsed.as_millis() as u64;
            tracing::debug!(operation = %name, elapsed_ms, "operation succeeded");
        }
        OperationStatus::Cancelled => tracing::debug!(operation = %name, "operation cancelled"),
        OperationStatus::Failed(reason) => {
            tracing::warn!(operation = %name, reason = %reason, fail_fast, "operation failed");
        }
        OperationStatus::TimedOut => {
            tracing::warn!(operation = %name, fail_fast, "operation timed out");
        }
    }

    OperationResult {
        name,
        status,
        fail_fast,
        elapsed,
    }
}
