use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

struct Clock;

struct FundRepository {
    _clock: Arc<Clock>,
}

struct UnitOfWork {
    id: usize,
}

struct ReportBuilder {
    _uow: Arc<UnitOfWork>,
}

struct NeedsMissing;
struct Missing;

struct Ping;
struct Pong;

static UOW_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn base_graph() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .register_singleton(|_| Ok(Clock))
        .register_singleton(|r| {
            Ok(FundRepository {
                _clock: r.resolve::<Clock>()?,
            })
        })
        .register_scoped(|_| {
            Ok(UnitOfWork {
                id: UOW_COUNTER.fetch_add(1, Ordering::SeqCst),
            })
        })
        .register_transient(|r| {
            Ok(ReportBuilder {
                _uow: r.resolve::<UnitOfWork>()?,
            })
        });
    services
}

#[test]
fn singletons_are_shared() {
    let provider = base_graph().build();
    let a = provider.resolve::<FundRepository>().unwrap();
    let b = provider.resolve::<FundRepository>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(provider.lifetime_of::<FundRepository>(), Some(Lifetime::Singleton));
}

#[test]
fn scoped_instances_are_per_scope() {
    let provider = base_graph().build();
    let first = provider.create_scope("task:first");
    let second = provider.create_scope("task:second");

    let a1 = first.resolve::<UnitOfWork>().unwrap();
    let a2 = first.resolve::<UnitOfWork>().unwrap();
    let b = second.resolve::<UnitOfWork>().unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert_ne!(a1.id, b.id);
    assert_eq!(first.instance_count(), 1);

    first.dispose();
    second.dispose();
}

#[test]
fn transients_are_fresh_and_share_the_scope() {
    let provider = base_graph().build();
    let scope = provider.create_scope("window");

    let r1 = scope.resolve::<ReportBuilder>().unwrap();
    let r2 = scope.resolve::<ReportBuilder>().unwrap();
    assert!(!Arc::ptr_eq(&r1, &r2));
    assert!(Arc::ptr_eq(&r1._uow, &r2._uow));
    scope.dispose();
}

#[test]
fn scoped_from_root_is_refused() {
    let provider = base_graph().build();
    let err = provider.resolve::<UnitOfWork>().err().unwrap();
    assert!(matches!(err, ResolveError::ScopedFromRoot(_)));
}

#[test]
fn singleton_cannot_capture_a_scoped_service() {
    struct Captive {
        _uow: Arc<UnitOfWork>,
    }
    let mut services = base_graph();
    services.register_singleton(|r| {
        Ok(Captive {
            _uow: r.resolve::<UnitOfWork>()?,
        })
    });
    let provider = services.build();
    let scope = provider.create_scope("window");
    assert!(matches!(
        scope.resolve::<Captive>(),
        Err(ResolveError::ScopedFromRoot(_))
    ));
    scope.dispose();
}

#[test]
fn validate_all_collects_every_failure() {
    let mut services = base_graph();
    services
        .register_singleton(|r| {
            r.resolve::<Missing>()?;
            Ok(NeedsMissing)
        })
        .register_singleton(|r| {
            r.resolve::<Pong>()?;
            Ok(Ping)
        })
        .register_singleton(|r| {
            r.resolve::<Ping>()?;
            Ok(Pong)
        });
    let provider = services.build();

    let failures = provider.validate_all().unwrap_err();
    assert_eq!(failures.len(), 3, "{failures:?}");
    assert!(failures[0].contains("is not registered"));
    assert!(failures[1].contains("dependency cycle"));
    assert!(failures[2].contains("dependency cycle"));
}

#[test]
fn cycle_path_names_each_service() {
    let mut services = ServiceCollection::new();
    services
        .register_singleton(|r| {
            r.resolve::<Pong>()?;
            Ok(Ping)
        })
        .register_singleton(|r| {
            r.resolve::<Ping>()?;
            Ok(Pong)
        });
    let provider = services.build();

    match provider.resolve::<Ping>() {
        Err(ResolveError::Cycle(path)) => {
            assert_eq!(path.len(), 3);
            assert!(path[0].ends_with("Ping"));
            assert!(path[1].ends_with("Pong"));
            assert!(path[2].ends_with("Ping"));
        }
        other => panic!("expected cycle, got {:?}", other.err()),
    }
}

#[test]
fn validate_all_does_not_populate_the_real_cache() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);
    struct Expensive;

    let mut services = ServiceCollection::new();
    services.register_singleton(|_| {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Expensive)
    });
    let provider = services.build();

    provider.validate_all().unwrap();
    assert_eq!(BUILT.load(Ordering::SeqCst), 1);

    provider.resolve::<Expensive>().unwrap();
    provider.resolve::<Expensive>().unwrap();
    assert_eq!(BUILT.load(Ordering::SeqCst), 2);
}

#[test]
fn validate_all_reports_panicking_factories() {
    struct Fragile;
    let mut services = ServiceCollection::new();
    services.register_singleton::<Fragile, _>(|_| panic!("bad connection string"));
    let provider = services.build();

    let failures = provider.validate_all().unwrap_err();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("bad connection string"));
}

#[test]
fn dispose_releases_scoped_instances() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    {
        let dropped = dropped.clone();
        services.register_scoped(move |_| Ok(Tracked(dropped.clone())));
    }
    let provider = services.build();

    let scope = provider.create_scope("task:migrate");
    let tracked = scope.resolve::<Tracked>().unwrap();
    drop(tracked);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);

    scope.dispose();
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_a_scope_still_releases_once() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    {
        let dropped = dropped.clone();
        services.register_scoped(move |_| Ok(Tracked(dropped.clone())));
    }
    let provider = services.build();
    {
        let scope = provider.create_scope("leaky");
        scope.resolve::<Tracked>().unwrap();
    }
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn instances_and_replacements() {
    struct Settings(u32);
    let mut services = ServiceCollection::new();
    services.register_instance(Arc::new(Settings(1)));
    services.register_instance(Arc::new(Settings(2)));
    assert_eq!(services.len(), 1);
    assert!(services.contains::<Settings>());

    let provider = services.build();
    assert_eq!(provider.resolve::<Settings>().unwrap().0, 2);
    assert_eq!(provider.service_names().len(), 1);
}
