use serde::{Deserialize, Serialize};
use std::fmt;

/// Named, monotonically ordered stage of the startup sequence.
///
/// Declaration order is the startup order; `Failed` sorts last but is
/// special-cased by [`StartupPhase::can_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    Bootstrap,
    SplashShown,
    Composed,
    TasksRunning,
    ShellStarted,
    WindowShown,
    BackgroundInit,
    Ready,
    Failed,
}

impl StartupPhase {
    pub const ALL: [StartupPhase; 9] = [
        StartupPhase::Bootstrap,
        StartupPhase::SplashShown,
        StartupPhase::Composed,
        StartupPhase::TasksRunning,
        StartupPhase::ShellStarted,
        StartupPhase::WindowShown,
        StartupPhase::BackgroundInit,
        StartupPhase::Ready,
        StartupPhase::Failed,
    ];

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Phases only move forward (skipping is allowed). `Failed` can be
    /// entered from any other phase and never left.
    pub fn can_advance_to(self, next: StartupPhase) -> bool {
        match (self, next) {
            (StartupPhase::Failed, _) => false,
            (_, StartupPhase::Failed) => true,
            (current, next) => next > current,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == StartupPhase::Failed
    }

    pub fn label(self) -> &'static str {
        match self {
            StartupPhase::Bootstrap => "bootstrap",
            StartupPhase::SplashShown => "splash-shown",
            StartupPhase::Composed => "composed",
            StartupPhase::TasksRunning => "tasks-running",
            StartupPhase::ShellStarted => "shell-started",
            StartupPhase::WindowShown => "window-shown",
            StartupPhase::BackgroundInit => "background-init",
            StartupPhase::Ready => "ready",
            StartupPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
