//! Guarded startup phase transitions.

use std::sync::{Arc, Mutex};

use civic_common::{EventBus, StartupEvent, StartupPhase};
use tokio::sync::watch;

use crate::util::lock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("cannot move startup phase back from {current} to {requested}")]
    Backwards {
        current: StartupPhase,
        requested: StartupPhase,
    },

    #[error("startup already failed")]
    AlreadyFailed,
}

/// Why startup entered [`StartupPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    /// The last phase reached before failing.
    pub from: StartupPhase,
    pub reason: String,
}

/// Holds the current [`StartupPhase`] and enforces forward-only movement.
///
/// Cheap to clone; all clones share the same state. Async observers use
/// [`PhaseTracker::subscribe`] or [`PhaseTracker::wait_for`].
#[derive(Clone)]
pub struct PhaseTracker {
    current: Arc<watch::Sender<StartupPhase>>,
    history: Arc<Mutex<Vec<StartupPhase>>>,
    failure: Arc<Mutex<Option<PhaseFailure>>>,
    events: Option<EventBus>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (current, _) = watch::channel(StartupPhase::Bootstrap);
        Self {
            current: Arc::new(current),
            history: Arc::new(Mutex::new(vec![StartupPhase::Bootstrap])),
            failure: Arc::new(Mutex::new(None)),
            events: None,
        }
    }

    /// Publish every transition as [`StartupEvent::PhaseChanged`].
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn current(&self) -> StartupPhase {
        *self.current.borrow()
    }

    /// Move forward to `next`. Returns `Ok(false)` when already there.
    /// Phases may be skipped; moving backwards is an error.
    pub fn advance(&self, next: StartupPhase) -> Result<bool, PhaseError> {
        if next == StartupPhase::Failed {
            return Ok(self.fail("advanced to failed"));
        }
        self.transition(next).map(|from| from.is_some())
    }

    /// Enter [`StartupPhase::Failed`]. Returns `true` only for the call that
    /// performed the transition; later calls are no-ops.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.transition(StartupPhase::Failed) {
            Ok(Some(from)) => {
                tracing::error!(phase = %from, reason = %reason, "startup failed");
                *lock(&self.failure) = Some(PhaseFailure { from, reason });
                true
            }
            _ => false,
        }
    }

    pub fn failure(&self) -> Option<PhaseFailure> {
        lock(&self.failure).clone()
    }

    pub fn is_failed(&self) -> bool {
        self.current() == StartupPhase::Failed
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> Vec<StartupPhase> {
        lock(&self.history).clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupPhase> {
        self.current.subscribe()
    }

    /// Resolve once `phase` (or any later phase) is reached, or startup fails.
    pub async fn wait_for(&self, phase: StartupPhase) -> StartupPhase {
        let mut rx = self.current.subscribe();
        let reached = match rx
            .wait_for(|p| *p >= phase || *p == StartupPhase::Failed)
            .await
        {
            Ok(reached) => *reached,
            Err(_) => self.current(),
        };
        reached
    }

    /// Returns the previous phase when a transition happened.
    fn transition(&self, next: StartupPhase) -> Result<Option<StartupPhase>, PhaseError> {
        let mut outcome = Ok(None);
        // The history lock is taken inside the watch lock so the recorded
        // order always matches the order observers see.
        self.current.send_if_modified(|current| {
            let from = *current;
            if from == next {
                return false;
            }
            if !from.can_advance_to(next) {
                outcome = Err(if from == StartupPhase::Failed {
                    PhaseError::AlreadyFailed
                } else {
                    PhaseError::Backwards {
                        current: from,
                        requested: next,
                    }
                });
                return false;
            }
            *current = next;
            lock(&self.history).push(next);
            outcome = Ok(Some(from));
            true
        });

        if let Ok(Some(from)) = outcome {
            if next != StartupPhase::Failed {
                tracing::info!(from = %from, to = %next, "startup phase advanced");
            }
            if let Some(events) = &self.events {
                events.publish(StartupEvent::PhaseChanged { from, to: next });
            }
        }
        outcome
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
