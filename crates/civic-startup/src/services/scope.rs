use std::sync::{Arc, Mutex};

use civic_common::ScopeId;

use crate::util::lock;

use super::provider::{ScopedInstances, ServiceProvider};
use super::ResolveError;

/// A unit-of-work boundary owning its scoped service instances.
///
/// `dispose` consumes the scope, so it can only happen once. A scope dropped
/// without `dispose` is released on the drop path with a warning.
pub struct ServiceScope {
    id: ScopeId,
    owner: String,
    provider: ServiceProvider,
    instances: Mutex<ScopedInstances>,
    disposed: bool,
}

impl ServiceScope {
    pub(crate) fn new(provider: ServiceProvider, owner: String) -> Self {
        let id = ScopeId::new();
        tracing::debug!(scope = %id, owner = %owner, "service scope created");
        Self {
            id,
            owner,
            provider,
            instances: Mutex::new(ScopedInstances::default()),
            disposed: false,
        }
    }

    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.provider.resolve_scoped::<T>(&self.instances)
    }

    /// Number of scoped instances created so far.
    pub fn instance_count(&self) -> usize {
        lock(&self.instances).order.len()
    }

    pub fn dispose(mut self) {
        self.release(true);
    }

    fn release(&mut self, explicit: bool) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        // Take the instances out first so their destructors run unlocked,
        // newest first.
        let released: Vec<_> = {
            let mut cache = lock(&self.instances);
            let order = std::mem::take(&mut cache.order);
            order
                .into_iter()
                .rev()
                .filter_map(|id| cache.instances.remove(&id))
                .collect()
        };
        let count = released.len();
        drop(released);

        if explicit {
            tracing::debug!(scope = %self.id, owner = %self.owner, instances = count, "service scope disposed");
        } else {
            tracing::warn!(scope = %self.id, owner = %self.owner, instances = count, "service scope dropped without dispose");
        }
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        self.release(false);
    }
}
