//! Cancellable async work owned by a view model.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::marshal::UiDispatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> OperationOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationOutcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            OperationOutcome::Completed(v) => Some(v),
            OperationOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationProgress {
    pub percentage: u8,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(OperationProgress) + Send + Sync>;

/// Wrap `callback` so it always runs on the UI thread.
pub fn ui_progress<F>(ui: UiDispatcher, callback: F) -> ProgressCallback
where
    F: Fn(OperationProgress) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    Arc::new(move |progress: OperationProgress| {
        let callback = callback.clone();
        if ui.post(move || callback(progress)).is_err() {
            tracing::debug!("ui loop closed, dropping operation progress");
        }
    })
}

/// Handed to the operation body.
#[derive(Clone)]
pub struct OperationContext {
    token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl OperationContext {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn report(&self, percentage: u8, message: impl Into<String>) {
        if let Some(progress) = &self.progress {
            progress(OperationProgress {
                percentage: percentage.min(100),
                message: message.into(),
            });
        }
    }
}

struct BusyGuard(Arc<AtomicUsize>);

impl BusyGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs async work on behalf of an owner (a window or view model).
///
/// Holds one cancellation token scoped to the owner; disposing or dropping
/// the `AsyncOperation` cancels everything it started.
pub struct AsyncOperation {
    owner: String,
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

impl AsyncOperation {
    /// `parent` is usually the owner's or the process root token.
    pub fn new(owner: impl Into<String>, parent: &CancellationToken) -> Self {
        Self {
            owner: owner.into(),
            token: parent.child_token(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel in-flight work. Further `execute` calls return `Cancelled`.
    pub fn dispose(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(owner = %self.owner, "disposing async operation");
            self.token.cancel();
        }
    }

    /// Run `op` to completion or cancellation.
    ///
    /// Cancellation, whether observed by `select` or reported by the body as
    /// an error after the token fired, yields `Ok(Cancelled)`. Other errors
    /// are logged and returned.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        progress: Option<ProgressCallback>,
        op: F,
    ) -> Result<OperationOutcome<T>, E>
    where
        F: FnOnce(OperationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self.token.is_cancelled() {
            tracing::debug!(owner = %self.owner, operation = name, "owner disposed, not starting");
            return Ok(OperationOutcome::Cancelled);
        }

        let _busy = BusyGuard::enter(&self.in_flight);
        let started = Instant::now();
        tracing::info!(owner = %self.owner, operation = name, "operation started");

        let ctx = OperationContext {
            token: self.token.clone(),
            progress,
        };
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            r = op(ctx) => Some(r),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Some(Ok(value)) => {
                tracing::info!(owner = %self.owner, operation = name, elapsed_ms, "operation completed");
                Ok(OperationOutcome::Completed(value))
            }
            Some(Err(_)) | None if self.token.is_cancelled() => {
                tracing::info!(owner = %self.owner, operation = name, elapsed_ms, "operation cancelled");
                Ok(OperationOutcome::Cancelled)
            }
            Some(Err(e)) => {
                tracing::error!(owner = %self.owner, operation = name, elapsed_ms, error = %e, "operation failed");
                Err(e)
            }
            None => Ok(OperationOutcome::Cancelled),
        }
    }
}

impl Drop for AsyncOperation {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
