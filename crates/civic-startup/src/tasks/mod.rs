//! Ordered startup tasks with fatal/non-fatal failure semantics.

mod descriptor;
mod registry;
mod runner;


pub use descriptor::{
    task_fn, FnTask, StartupTask, StartupTaskDescriptor, TaskContext, TaskError, DEFAULT_TASK_TIMEOUT,
};
pub use registry::{RegistrationError, StartupTaskRegistry};
pub use runner::{RunnerState, StartupTaskRunner, TaskRunReport, TaskWarning};
