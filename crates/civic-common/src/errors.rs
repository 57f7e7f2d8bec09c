use std::path::PathBuf;

use crate::types::StartupPhase;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("config source error: {0}")]
    SourceError(String),
}

/// Fatal startup failures. Anything that reaches the process entry point as a
/// `StartupError` terminates the process with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("service composition failed: {}", .0.join("; "))]
    Composition(Vec<String>),

    #[error("fatal startup task '{task}' failed during {phase}: {reason}")]
    FatalTask {
        task: String,
        phase: StartupPhase,
        reason: String,
    },

    #[error("background initialization failed: {}", .causes.join("; "))]
    Background { causes: Vec<String> },

    #[error("startup cancelled during {phase}")]
    Cancelled { phase: StartupPhase },

    #[error("window error: {0}")]
    Window(String),

    #[error("ui marshal error: {0}")]
    Marshal(String),

    #[error("{0} was already started")]
    AlreadyStarted(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// The task name for task failures, used in the fatal diagnostic.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            StartupError::FatalTask { task, .. } => Some(task),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::SourceError("vault sealed".into());
        assert_eq!(err.to_string(), "config source error: vault sealed");
    }

    #[test]
    fn fatal_task_display_names_task_and_phase() {
        let err = StartupError::FatalTask {
            task: "verify-license".into(),
            phase: StartupPhase::TasksRunning,
            reason: "timed out after 1s".into(),
        };
        assert_eq!(
            err.to_string(),
            "fatal startup task 'verify-license' failed during tasks-running: timed out after 1s"
        );
        assert_eq!(err.task_name(), Some("verify-license"));
    }

    #[test]
    fn composition_joins_all_failures() {
        let err = StartupError::Composition(vec!["a missing".into(), "b cycle".into()]);
        assert_eq!(
            err.to_string(),
            "service composition failed: a missing; b cycle"
        );
    }

    #[test]
    fn background_joins_all_causes() {
        let err = StartupError::Background {
            causes: vec!["storage unreachable".into(), "probe 'db' panicked".into()],
        };
        assert!(err.to_string().contains("storage unreachable"));
        assert!(err.to_string().contains("probe 'db' panicked"));
    }

    #[test]
    fn every_startup_error_exits_non_zero() {
        let errors = [
            StartupError::Cancelled {
                phase: StartupPhase::Bootstrap,
            },
            StartupError::Window("no display".into()),
            StartupError::AlreadyStarted("background initialization"),
        ];
        for err in errors {
            assert_ne!(err.exit_code(), 0);
            assert_eq!(err.task_name(), None);
        }
    }

    #[test]
    fn startup_error_from_config() {
        let err: StartupError = ConfigError::ValidationError("bad".into()).into();
        assert!(matches!(err, StartupError::Config(_)));
    }
}
