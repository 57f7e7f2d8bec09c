//! Dependency graph: registrations, resolution and scopes.
//!
//! Services are registered into a [`ServiceCollection`] with a [`Lifetime`]
//! and a factory, then frozen into an immutable [`ServiceProvider`].
//! [`ServiceProvider::validate_all`] constructs every registration once so
//! missing dependencies and cycles surface before any UI is shown.

mod collection;
mod provider;
mod scope;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::sync::Arc;

pub use collection::ServiceCollection;
pub use provider::{Resolver, ServiceProvider};
pub use scope::ServiceScope;

pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance per provider.
    Singleton,
    /// One instance per [`ServiceScope`].
    Scoped,
    /// A new instance per resolution.
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("service {0} is not registered")]
    NotRegistered(&'static str),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<&'static str>),

    #[error("scoped service {0} cannot be resolved outside a scope")]
    ScopedFromRoot(&'static str),

    #[error("factory for {service} failed: {reason}")]
    Factory {
        service: &'static str,
        reason: String,
    },
}

impl ResolveError {
    /// Convenience for factories that fail on their own.
    pub fn factory(service: &'static str, reason: impl Into<String>) -> Self {
        ResolveError::Factory {
            service,
            reason: reason.into(),
        }
    }
}
