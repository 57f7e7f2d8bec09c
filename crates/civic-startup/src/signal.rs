//! Single-assignment completion signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Returned when a signal that already holds a value is completed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("completion signal was already fulfilled")]
pub struct AlreadyCompleted;

/// A value fulfilled exactly once and awaitable any number of times.
///
/// Every waiter, early or late, observes the same `Arc`. There is no reset.
pub struct CompletionSignal<T> {
    slot: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T> Clone for CompletionSignal<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> CompletionSignal<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Fulfil the signal. Only the first call stores its value.
    pub fn complete(&self, value: T) -> Result<(), AlreadyCompleted> {
        let stored = self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::new(value));
            true
        });
        if stored {
            Ok(())
        } else {
            Err(AlreadyCompleted)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// The value, if already fulfilled.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.borrow().clone()
    }

    /// Wait until fulfilled.
    pub async fn wait(&self) -> Arc<T> {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // `self` keeps the sender alive, so `changed` only fails if the
            // signal is being torn down; wait forever in that case.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Wait at most `limit`. `None` on timeout.
    pub async fn wait_timeout(&self, limit: Duration) -> Option<Arc<T>> {
        tokio::time::timeout(limit, self.wait()).await.ok()
    }
}

impl<T: Send + Sync + 'static> Default for CompletionSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}
