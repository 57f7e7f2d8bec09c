use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use civic_common::{StartupError, StartupEvent, StartupPhase};
use futures_util::FutureExt;
use tokio::time::Instant;

use crate::context::StartupContext;
use crate::services::ServiceProvider;
use crate::util::{lock, panic_message};

use super::descriptor::{TaskContext, TaskError};
use super::registry::RegisteredTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A non-fatal task failure, surfaced to the user after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWarning {
    pub task: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRunReport {
    /// Tasks that were started, in execution order.
    pub executed: Vec<String>,
    pub warnings: Vec<TaskWarning>,
    pub elapsed: Duration,
}

enum TaskOutcome {
    Succeeded,
    Failed(String),
    TimedOut(Duration),
    Cancelled,
}

/// Executes registered tasks one at a time in ordinal order. Runs once.
pub struct StartupTaskRunner {
    tasks: Vec<RegisteredTask>,
    state: Mutex<RunnerState>,
    progress_band: (u8, u8),
}

impl StartupTaskRunner {
    pub(crate) fn new(tasks: Vec<RegisteredTask>) -> Self {
        Self {
            tasks,
            state: Mutex::new(RunnerState::Idle),
            progress_band: (25, 60),
        }
    }

    /// Percentages reported while the tasks run, first task to last.
    pub fn with_progress_band(mut self, start: u8, end: u8) -> Self {
        self.progress_band = (start.min(100), end.clamp(start.min(100), 100));
        self
    }

    pub fn state(&self) -> RunnerState {
        *lock(&self.state)
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.descriptor.name()).collect()
    }

    pub async fn run(
        &self,
        ctx: &StartupContext,
        provider: &ServiceProvider,
    ) -> Result<TaskRunReport, StartupError> {
        {
            let mut state = lock(&self.state);
            if *state != RunnerState::Idle {
                return Err(StartupError::AlreadyStarted("startup task runner"));
            }
            *state = RunnerState::Running;
        }

        let started = Instant::now();
        let mut report = TaskRunReport::default();

        if ctx.root().is_cancelled() {
            return Err(self.cancelled(ctx));
        }
        let entered = ctx.advance(
            StartupPhase::TasksRunning,
            self.progress_band.0,
            "Running startup tasks",
        );
        if let Err(e) = entered {
            tracing::warn!(error = %e, "task runner started outside the expected phase");
        }

        let total = self.tasks.len();
        for (index, entry) in self.tasks.iter().enumerate() {
            if ctx.root().is_cancelled() {
                return Err(self.cancelled(ctx));
            }

            let descriptor = &entry.descriptor;
            let name = descriptor.name();
            ctx.report(self.percentage(index, total), format!("Running {name}"));
            tracing::info!(task = name, ordinal = descriptor.ordinal(), "startup task started");

            let scope = Arc::new(provider.create_scope(format!("task:{name}")));
            let token = ctx.root().child_token();
            let task_ctx = TaskContext::new(name, scope.clone(), token.clone());
            let task_started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = ctx.root().cancelled() => TaskOutcome::Cancelled,
                result = tokio::time::timeout(
                    descriptor.timeout(),
                    AssertUnwindSafe(entry.task.run(task_ctx)).catch_unwind(),
                ) => {
                    match result {
                        Ok(Ok(Ok(()))) => TaskOutcome::Succeeded,
                        Ok(Ok(Err(TaskError::Cancelled))) if ctx.root().is_cancelled() => {
                            TaskOutcome::Cancelled
                        }
                        Ok(Ok(Err(e))) => TaskOutcome::Failed(e.to_string()),
                        Ok(Err(payload)) => TaskOutcome::Failed(format!(
                            "panicked: {}",
                            panic_message(payload.as_ref())
                        )),
                        Err(_) => TaskOutcome::TimedOut(descriptor.timeout()),
                    }
                }
            };

            // Stop anything the task left running on its token, then release
            // its scope. A task that kept a clone of its context releases the
            // scope when that clone is dropped.
            token.cancel();
            match Arc::try_unwrap(scope) {
                Ok(scope) => scope.dispose(),
                Err(_) => tracing::debug!(task = name, "task retained its scope past completion"),
            }

            let elapsed_ms = task_started.elapsed().as_millis() as u64;
            report.executed.push(name.to_string());

            let reason = match outcome {
                TaskOutcome::Succeeded => {
                    tracing::info!(task = name, elapsed_ms, "startup task completed");
                    continue;
                }
                TaskOutcome::Cancelled => return Err(self.cancelled(ctx)),
                TaskOutcome::Failed(reason) => reason,
                TaskOutcome::TimedOut(limit) => {
                    format!("timed out after {}ms", limit.as_millis())
                }
            };

            if descriptor.is_fatal() {
                let phase = ctx.phases().current();
                tracing::error!(
                    task = name,
                    ordinal = descriptor.ordinal(),
                    phase = %phase,
                    elapsed_ms,
                    reason = %reason,
                    correlation_id = %ctx.correlation_id(),
                    "fatal startup task failed"
                );
                ctx.fail(format!("{name}: {reason}"));
                *lock(&self.state) = RunnerState::Failed;
                return Err(StartupError::FatalTask {
                    task: name.to_string(),
                    phase,
                    reason,
                });
            }

            tracing::warn!(task = name, elapsed_ms, reason = %reason, "non-fatal startup task failed");
            ctx.events().publish(StartupEvent::TaskWarning {
                task: name.to_string(),
                reason: reason.clone(),
            });
            report.warnings.push(TaskWarning {
                task: name.to_string(),
                reason,
            });
        }

        report.elapsed = started.elapsed();
        *lock(&self.state) = RunnerState::Completed;
        tracing::info!(
            tasks = total,
            warnings = report.warnings.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "startup tasks finished"
        );
        Ok(report)
    }

    fn percentage(&self, index: usize, total: usize) -> u8 {
        let (start, end) = self.progress_band;
        if total == 0 {
            return start;
        }
        let span = (end - start) as usize;
        start + (span * index / total) as u8
    }

    fn cancelled(&self, ctx: &StartupContext) -> StartupError {
        let phase = ctx.phases().current();
        tracing::warn!(phase = %phase, "startup cancelled, no further tasks will run");
        ctx.fail("startup cancelled");
        *lock(&self.state) = RunnerState::Failed;
        StartupError::Cancelled { phase }
    }
}
