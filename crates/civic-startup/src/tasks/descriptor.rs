use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::services::{ResolveError, ServiceScope};

/// Default per-task timeout when a descriptor does not set one.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity and failure policy of one startup task. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupTaskDescriptor {
    name: String,
    ordinal: u32,
    fatal: bool,
    timeout: Duration,
}

impl StartupTaskDescriptor {
    /// A fatal task with the default timeout.
    pub fn new(name: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            ordinal,
            fatal: true,
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Failures become warnings instead of aborting startup.
    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("task observed cancellation")]
    Cancelled,
}

impl TaskError {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskError::Failed(reason.into())
    }
}

/// What a running task gets: its own service scope and cancellation token.
#[derive(Clone)]
pub struct TaskContext {
    name: Arc<str>,
    scope: Arc<ServiceScope>,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(name: &str, scope: Arc<ServiceScope>, token: CancellationToken) -> Self {
        Self {
            name: Arc::from(name),
            scope,
            token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.scope.resolve::<T>()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
pub trait StartupTask: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError>;
}

/// [`StartupTask`] from an async closure.
pub struct FnTask<F> {
    run: F,
}

pub fn task_fn<F, Fut>(run: F) -> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    FnTask { run }
}

#[async_trait]
impl<F, Fut> StartupTask for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        (self.run)(ctx).await
    }
}
