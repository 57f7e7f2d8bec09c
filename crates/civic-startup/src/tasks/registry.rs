use std::sync::Arc;
use std::time::Duration;

use super::descriptor::{StartupTask, StartupTaskDescriptor, DEFAULT_TASK_TIMEOUT};
use super::runner::StartupTaskRunner;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("startup task '{0}' is already registered")]
    DuplicateName(String),

    #[error("ordinal {ordinal} of '{name}' is already used by '{existing}'")]
    DuplicateOrdinal {
        name: String,
        ordinal: u32,
        existing: String,
    },
}

pub(crate) struct RegisteredTask {
    pub(crate) descriptor: StartupTaskDescriptor,
    pub(crate) task: Arc<dyn StartupTask>,
}

/// Collects startup tasks. Frozen into a runner once registration is done.
#[derive(Default)]
pub struct StartupTaskRegistry {
    tasks: Vec<RegisteredTask>,
}

impl StartupTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: StartupTaskDescriptor,
        task: impl StartupTask + 'static,
    ) -> Result<&mut Self, RegistrationError> {
        for existing in &self.tasks {
            if existing.descriptor.name() == descriptor.name() {
                return Err(RegistrationError::DuplicateName(descriptor.name().to_string()));
            }
            if existing.descriptor.ordinal() == descriptor.ordinal() {
                return Err(RegistrationError::DuplicateOrdinal {
                    name: descriptor.name().to_string(),
                    ordinal: descriptor.ordinal(),
                    existing: existing.descriptor.name().to_string(),
                });
            }
        }
        tracing::debug!(
            task = descriptor.name(),
            ordinal = descriptor.ordinal(),
            fatal = descriptor.is_fatal(),
            "startup task registered"
        );
        self.tasks.push(RegisteredTask {
            descriptor,
            task: Arc::new(task),
        });
        Ok(self)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StartupTaskDescriptor> {
        self.tasks.iter().map(|t| &t.descriptor)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Apply `timeout` to every task still on the built-in default.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        for entry in &mut self.tasks {
            if entry.descriptor.timeout() == DEFAULT_TASK_TIMEOUT {
                entry.descriptor = entry.descriptor.clone().with_timeout(timeout);
            }
        }
        self
    }

    /// Sort by ordinal and hand the tasks to a runner. No further
    /// registration is possible.
    ///
    /// Execution order is the ordinal order; the order of `register` calls
    /// is ignored. Ordinals are unique, so the order is total.
    pub fn freeze(mut self) -> StartupTaskRunner {
        self.tasks.sort_by_key(|t| t.descriptor.ordinal());
        StartupTaskRunner::new(self.tasks)
    }
}
