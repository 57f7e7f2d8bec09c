use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::provider::{Registration, Resolver, ServiceFactory, ServiceProvider};
use super::{AnyService, Lifetime, ResolveError};

/// Mutable registration surface. Frozen by [`ServiceCollection::build`].
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, Registration>,
    order: Vec<TypeId>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Singleton, factory)
    }

    pub fn register_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Scoped, factory)
    }

    pub fn register_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Transient, factory)
    }

    /// Register an already-built singleton, e.g. the loaded configuration.
    pub fn register_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        let factory: ServiceFactory =
            Arc::new(move |_: &Resolver<'_>| Ok::<_, ResolveError>(instance.clone() as AnyService));
        self.insert::<T>(Lifetime::Singleton, factory)
    }

    pub fn register<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        let factory: ServiceFactory = Arc::new(move |resolver: &Resolver<'_>| {
            factory(resolver).map(|v| Arc::new(v) as AnyService)
        });
        self.insert::<T>(lifetime, factory)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider::from_parts(self.registrations, self.order)
    }

    fn insert<T: 'static>(&mut self, lifetime: Lifetime, factory: ServiceFactory) -> &mut Self {
        let id = TypeId::of::<T>();
        let registration = Registration {
            type_name: type_name::<T>(),
            lifetime,
            factory,
        };
        if self.registrations.insert(id, registration).is_some() {
            tracing::debug!(service = type_name::<T>(), "service registration replaced");
        } else {
            self.order.push(id);
        }
        self
    }
}
