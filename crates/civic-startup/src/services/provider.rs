use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::util::{lock, panic_message};

use super::scope::ServiceScope;
use super::{AnyService, Lifetime, ResolveError};

pub(crate) type ServiceFactory =
    Arc<dyn Fn(&Resolver<'_>) -> Result<AnyService, ResolveError> + Send + Sync>;

pub(crate) struct Registration {
    pub(crate) type_name: &'static str,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: ServiceFactory,
}

/// Instances owned by one scope, with their creation order.
#[derive(Default)]
pub(crate) struct ScopedInstances {
    pub(crate) instances: HashMap<TypeId, AnyService>,
    pub(crate) order: Vec<TypeId>,
}

type SingletonCache = Mutex<HashMap<TypeId, AnyService>>;
type ResolutionStack = RefCell<Vec<(TypeId, &'static str)>>;

/// Passed to factories to resolve their own dependencies.
pub struct Resolver<'a> {
    registrations: &'a HashMap<TypeId, Registration>,
    singletons: &'a SingletonCache,
    scope: Option<&'a Mutex<ScopedInstances>>,
    stack: &'a ResolutionStack,
}

impl<'a> Resolver<'a> {
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let name = type_name::<T>();
        self.resolve_any(TypeId::of::<T>(), name)?
            .downcast::<T>()
            .map_err(|_| ResolveError::factory(name, "factory produced a different type"))
    }

    fn resolve_any(&self, id: TypeId, name: &'static str) -> Result<AnyService, ResolveError> {
        let registration = self
            .registrations
            .get(&id)
            .ok_or(ResolveError::NotRegistered(name))?;

        match registration.lifetime {
            Lifetime::Singleton => {
                if let Some(existing) = lock(self.singletons).get(&id) {
                    return Ok(existing.clone());
                }
                // Singletons never see the requesting scope, so a singleton
                // that depends on a scoped service fails to resolve.
                let created = self.construct(id, registration, None)?;
                Ok(lock(self.singletons).entry(id).or_insert(created).clone())
            }
            Lifetime::Scoped => {
                let scope = self
                    .scope
                    .ok_or(ResolveError::ScopedFromRoot(registration.type_name))?;
                if let Some(existing) = lock(scope).instances.get(&id) {
                    return Ok(existing.clone());
                }
                let created = self.construct(id, registration, Some(scope))?;
                let mut cache = lock(scope);
                if !cache.instances.contains_key(&id) {
                    cache.order.push(id);
                }
                Ok(cache.instances.entry(id).or_insert(created).clone())
            }
            Lifetime::Transient => self.construct(id, registration, self.scope),
        }
    }

    fn construct(
        &self,
        id: TypeId,
        registration: &Registration,
        scope: Option<&'a Mutex<ScopedInstances>>,
    ) -> Result<AnyService, ResolveError> {
        {
            let stack = self.stack.borrow();
            if let Some(start) = stack.iter().position(|(t, _)| *t == id) {
                let mut path: Vec<&'static str> = stack[start..].iter().map(|(_, n)| *n).collect();
                path.push(registration.type_name);
                return Err(ResolveError::Cycle(path));
            }
        }

        self.stack.borrow_mut().push((id, registration.type_name));
        let nested = Resolver {
            registrations: self.registrations,
            singletons: self.singletons,
            scope,
            stack: self.stack,
        };
        let result = (registration.factory)(&nested);
        self.stack.borrow_mut().pop();
        result
    }
}

struct ProviderInner {
    registrations: HashMap<TypeId, Registration>,
    order: Vec<TypeId>,
    singletons: SingletonCache,
}

/// Immutable, validated service graph. Cheap to clone.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    pub(crate) fn from_parts(registrations: HashMap<TypeId, Registration>, order: Vec<TypeId>) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                registrations,
                order,
                singletons: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve from the root. Scoped services are refused here.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let stack = RefCell::new(Vec::new());
        self.resolver(None, &stack).resolve::<T>()
    }

    pub(crate) fn resolve_scoped<T: Send + Sync + 'static>(
        &self,
        scope: &Mutex<ScopedInstances>,
    ) -> Result<Arc<T>, ResolveError> {
        let stack = RefCell::new(Vec::new());
        self.resolver(Some(scope), &stack).resolve::<T>()
    }

    pub fn create_scope(&self, owner: impl Into<String>) -> ServiceScope {
        ServiceScope::new(self.clone(), owner.into())
    }

    pub fn lifetime_of<T: 'static>(&self) -> Option<Lifetime> {
        self.inner
            .registrations
            .get(&TypeId::of::<T>())
            .map(|r| r.lifetime)
    }

    pub fn len(&self) -> usize {
        self.inner.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registrations.is_empty()
    }

    /// Registered type names in registration order.
    pub fn service_names(&self) -> Vec<&'static str> {
        self.inner
            .order
            .iter()
            .filter_map(|id| self.inner.registrations.get(id))
            .map(|r| r.type_name)
            .collect()
    }

    /// Construct every registration once, in a throwaway cache, and collect
    /// every failure. The provider's own caches are left untouched.
    pub fn validate_all(&self) -> Result<(), Vec<String>> {
        let singletons: SingletonCache = Mutex::new(HashMap::new());
        let scope = Mutex::new(ScopedInstances::default());
        let mut failures = Vec::new();

        for id in &self.inner.order {
            let Some(registration) = self.inner.registrations.get(id) else {
                continue;
            };
            let stack = RefCell::new(Vec::new());
            let resolver = Resolver {
                registrations: &self.inner.registrations,
                singletons: &singletons,
                scope: Some(&scope),
                stack: &stack,
            };
            match catch_unwind(AssertUnwindSafe(|| resolver.resolve_any(*id, registration.type_name))) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => failures.push(format!("{}: {e}", registration.type_name)),
                Err(payload) => failures.push(format!(
                    "{}: factory panicked: {}",
                    registration.type_name,
                    panic_message(payload.as_ref())
                )),
            }
        }

        if failures.is_empty() {
            tracing::info!(services = self.len(), "service graph validated");
            Ok(())
        } else {
            for failure in &failures {
                tracing::error!(failure = %failure, "service graph validation failure");
            }
            Err(failures)
        }
    }

    fn resolver<'a>(
        &'a self,
        scope: Option<&'a Mutex<ScopedInstances>>,
        stack: &'a ResolutionStack,
    ) -> Resolver<'a> {
        Resolver {
            registrations: &self.inner.registrations,
            singletons: &self.inner.singletons,
            scope,
            stack,
        }
    }
}
