//! Process-wide startup state shared by every component.

use civic_common::{EventBus, StartupPhase};
use tokio_util::sync::CancellationToken;

use crate::phase::{PhaseError, PhaseTracker};
use crate::progress::ProgressReporter;
use crate::ui::UiDispatcher;

/// The root cancellation token, phase tracker, progress reporter, event bus
/// and UI dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct StartupContext {
    root: CancellationToken,
    phases: PhaseTracker,
    progress: ProgressReporter,
    events: EventBus,
    ui: UiDispatcher,
}

impl StartupContext {
    pub fn new(ui: UiDispatcher) -> Self {
        let events = EventBus::new(64);
        Self {
            root: CancellationToken::new(),
            phases: PhaseTracker::new().with_events(events.clone()),
            progress: ProgressReporter::new(ui.clone()),
            events,
            ui,
        }
    }

    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn ui(&self) -> &UiDispatcher {
        &self.ui
    }

    pub fn correlation_id(&self) -> &str {
        self.progress.correlation_id()
    }

    /// Report progress within the current phase.
    pub fn report(&self, percentage: u8, message: impl Into<String>) {
        self.progress.report(self.phases.current(), percentage, message);
    }

    /// Enter `phase` and report it.
    pub fn advance(
        &self,
        phase: StartupPhase,
        percentage: u8,
        message: impl Into<String>,
    ) -> Result<(), PhaseError> {
        self.phases.advance(phase)?;
        self.progress.report(phase, percentage, message);
        Ok(())
    }

    /// Enter the terminal `Failed` phase. `true` for the call that did it.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let failed = self.phases.fail(reason.clone());
        if failed {
            self.progress
                .report(StartupPhase::Failed, 100, format!("Startup failed: {reason}"));
        }
        failed
    }

    /// Cancel all startup work.
    pub fn cancel(&self) {
        if !self.root.is_cancelled() {
            tracing::info!(correlation_id = %self.correlation_id(), "cancelling startup");
            self.root.cancel();
        }
    }
}
