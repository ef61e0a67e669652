use std::{
    convert::Infallible,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use component_resolver::{
    Component, Dependencies, DependencySlot, Injected, Instance, RequireError, ResolveError,
    Resolver, ResolverConfig,
};
use futures::{executor::block_on, join, FutureExt};
use futures_channel::oneshot;

/// Resolves after `delay`, driven by a helper thread
fn after<T: Send + 'static>(delay: Duration, value: T) -> impl Future<Output = T> + Send {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = tx.send(value);
    });
    async move { rx.await.expect("sender outlives the delay") }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// A factory producing its label, counting invocations
fn counted(label: &'static str, calls: &Arc<AtomicUsize>) -> Component {
    let calls = calls.clone();
    Component::factory(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(label)
    })
    .label(label)
    .build()
}

/// A factory appending its label to a shared log once invoked
fn logged(
    label: &'static str,
    log: &Arc<Mutex<Vec<&'static str>>>,
    dependencies: impl Into<Dependencies>,
) -> Component {
    let log = log.clone();
    Component::factory(move |_| {
        log.lock().expect("log").push(label);
        Ok::<_, Infallible>(label)
    })
    .label(label)
    .depends_on(dependencies)
    .build()
}

/// Resolves to the given value after `delay`
fn slow<T: Clone + Send + Sync + 'static>(
    label: &'static str,
    delay: Duration,
    value: T,
    calls: &Arc<AtomicUsize>,
) -> Component {
    let calls = calls.clone();
    Component::async_factory(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        after(delay, Ok::<_, Infallible>(value.clone()))
    })
    .label(label)
    .build()
}

fn resolver_with_timeout(timeout: Duration) -> Resolver {
    Resolver::with_config(ResolverConfig {
        resolve_timeout: timeout,
    })
}

#[test]
fn repeated_get_returns_the_cached_instance() {
    let calls = counter();
    let a = counted("A", &calls);
    let resolver = Resolver::new();

    let first = block_on(resolver.get(&a)).expect("A");
    let second = block_on(resolver.get(&a)).expect("A");

    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn dependencies_are_instantiated_before_dependents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = logged("a", &log, Dependencies::none());
    let b = logged("b", &log, &a);
    let c = logged("c", &log, &a);
    let d = logged("d", &log, [&b, &c]);
    let resolver = Resolver::new();

    block_on(resolver.get(&d)).expect("d");

    assert_eq!(*log.lock().expect("log"), vec!["a", "b", "c", "d"]);
    assert_eq!(resolver.len(), 4);
}

#[test]
fn shared_dependency_is_instantiated_once() {
    let calls = counter();
    let a = counted("A", &calls);
    let b = Component::factory(|injected: Injected| Ok::<_, RequireError>(injected.get::<&str>(0)?))
        .label("B")
        .depends_on(&a)
        .build();
    let c = Component::factory(|injected: Injected| Ok::<_, RequireError>(injected.get::<&str>(0)?))
        .label("C")
        .depends_on(&a)
        .build();
    let resolver = Resolver::new();

    let [b, c] = block_on(resolver.get([b, c])).expect("B and C");

    let from_b = b.downcast::<Arc<&str>>().expect("B");
    let from_c = c.downcast::<Arc<&str>>().expect("C");
    assert!(Arc::ptr_eq(&*from_b, &*from_c));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn self_dependency_is_a_cycle() {
    let calls = counter();
    let g = counted("G", &calls);
    g.declare(&g);
    let resolver = Resolver::new();

    let err = block_on(resolver.get(&g)).unwrap_err();

    match err {
        ResolveError::CyclicDependency { chain } => assert_eq!(chain, vec!["G", "G"]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(resolver.is_empty());
}

#[test]
fn mutual_dependency_is_a_cycle() {
    let calls = counter();
    let f = counted("F", &calls);
    let e = Component::factory(|_| Ok::<_, Infallible>(()))
        .label("E")
        .depends_on(&f)
        .build();
    f.declare(&e);
    let resolver = Resolver::new();

    let err = block_on(resolver.get(&e)).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Component has recursive dependencies: E -> F -> E"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cycle_below_an_acyclic_root_fails_the_whole_call() {
    let calls = counter();
    let a = counted("A", &calls);
    let f = counted("F", &calls);
    let e = Component::factory(|_| Ok::<_, Infallible>(()))
        .label("E")
        .depends_on(&f)
        .build();
    f.declare(&e);
    let root = Component::factory(|_| Ok::<_, Infallible>(()))
        .label("Root")
        .depends_on([&a, &e])
        .build();
    let resolver = Resolver::new();

    let err = block_on(resolver.get(&root)).unwrap_err();

    assert!(matches!(err, ResolveError::CyclicDependency { ref chain } if chain == &["E", "F", "E"]));
    // Nothing runs before the graph is known to be sound
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn late_factory_times_out() {
    let calls = counter();
    let late = slow("Late", Duration::from_millis(300), 1_u8, &calls);
    let resolver = resolver_with_timeout(Duration::from_millis(20));

    let err = block_on(resolver.get(&late)).unwrap_err();

    match err {
        ResolveError::InstantiationTimeout { component, timeout } => {
            assert_eq!(component, "Late");
            assert_eq!(timeout, Duration::from_millis(20));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!resolver.contains(&late));
}

#[test]
fn timed_out_factory_keeps_working_in_the_background() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let late = Component::async_factory(move |_| {
        let flag = flag.clone();
        async move {
            after(Duration::from_millis(100), ()).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, Infallible>("late")
        }
    })
    .label("Late")
    .build();
    let resolver = resolver_with_timeout(Duration::from_millis(20));

    let err = block_on(resolver.get(&late)).unwrap_err();
    assert!(matches!(err, ResolveError::InstantiationTimeout { .. }));

    thread::sleep(Duration::from_millis(400));
    assert!(finished.load(Ordering::SeqCst));
    // Its late result is neither cached nor reported
    assert!(!resolver.contains(&late));
    assert!(resolver.is_empty());
}

#[test]
fn early_factory_beats_the_timeout() {
    let calls = counter();
    let early = slow("Early", Duration::from_millis(5), 1_u8, &calls);
    let resolver = resolver_with_timeout(Duration::from_millis(500));

    let instance = block_on(resolver.get(&early)).expect("settles in time");

    assert_eq!(*instance.downcast::<u8>().expect("u8"), 1);
    assert!(resolver.contains(&early));
}

#[test]
fn timeout_applies_to_each_factory_alone() {
    let calls = counter();
    let first = slow("First", Duration::from_millis(100), 1_u8, &calls);
    let second = Component::async_factory(|_| {
        after(Duration::from_millis(100), Ok::<_, Infallible>(2_u8))
    })
    .label("Second")
    .depends_on(&first)
    .build();
    let resolver = resolver_with_timeout(Duration::from_millis(150));

    block_on(resolver.get(&second)).expect("each factory settles within the timeout");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn provided_instance_is_injected_without_invoking_the_factory() {
    let calls = counter();
    let a = counted("A", &calls);
    let b = Component::factory(|injected: Injected| {
        Ok::<_, Infallible>(injected.instance(0).cloned())
    })
    .label("B")
    .depends_on(&a)
    .build();
    let mock = Instance::new("mock");
    let resolver = Resolver::new();

    resolver.provide_instance(&a, mock.clone());
    let b = block_on(resolver.get(&b)).expect("B");

    let injected = b.downcast::<Option<Instance>>().expect("B");
    assert!(Option::as_ref(&injected).expect("A injected").ptr_eq(&mock));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn provide_overwrites_a_resolved_instance() {
    let calls = counter();
    let a = counted("A", &calls);
    let resolver = Resolver::new();
    block_on(resolver.get(&a)).expect("A");

    resolver.provide(&a, "mock");

    let a = block_on(resolver.get(&a)).expect("A");
    assert_eq!(*a.downcast::<&str>().expect("str"), "mock");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_forgets_resolved_instances() {
    let calls = counter();
    let a = counted("A", &calls);
    let resolver = Resolver::new();

    let before = block_on(resolver.get(&a)).expect("A");
    resolver.clear();
    assert!(!resolver.contains(&a));
    assert!(resolver.is_empty());
    let after = block_on(resolver.get(&a)).expect("A");

    assert!(!before.ptr_eq(&after));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Handed out instances stay usable
    assert_eq!(*before.downcast::<&str>().expect("str"), "A");
}

#[derive(Debug)]
struct A;
#[derive(Debug)]
struct B {
    a: Arc<A>,
}
#[derive(Debug)]
struct C {
    b: Arc<B>,
}

#[test]
fn chain_is_fully_populated_and_shared() {
    let a = Component::factory(|_| Ok::<_, Infallible>(A))
        .label("A")
        .build();
    let b = Component::factory(|injected: Injected| Ok::<_, RequireError>(B { a: injected.get(0)? }))
        .label("B")
        .depends_on(&a)
        .build();
    let c = Component::async_factory(|injected: Injected| async move {
        Ok::<_, RequireError>(C { b: injected.get(0)? })
    })
    .label("C")
    .depends_on(&b)
    .build();
    let resolver = Resolver::new();

    let c = block_on(resolver.get_as::<C>(&c)).expect("C");
    let a = block_on(resolver.get_as::<A>(&a)).expect("A");

    assert!(Arc::ptr_eq(&c.b.a, &a));
    assert_eq!(resolver.len(), 3);
}

#[test]
fn undefined_slot_fails_before_anything_runs() {
    let calls = counter();
    let a = counted("A", &calls);
    let repository = Component::factory(|_| Ok::<_, Infallible>(()))
        .label("Repository")
        .depends_on(Dependencies::named_slots([("cache", Some(a.clone())), ("db", None)]))
        .build();
    let resolver = Resolver::new();

    let err = block_on(resolver.get(&repository)).unwrap_err();

    match err {
        ResolveError::UndefinedDependency { component, slot } => {
            assert_eq!(component, "Repository");
            assert_eq!(slot, DependencySlot::Name("db".into()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn single_dependency_is_injected_positionally() {
    let a = Component::labeled_value("A", 5_u32);
    let b = Component::factory(|injected: Injected| {
        assert_eq!(injected.len(), 1);
        Ok::<_, RequireError>(*injected.get::<u32>(0)? * 2)
    })
    .depends_on(a)
    .build();
    let resolver = Resolver::new();

    let b = block_on(resolver.get_as::<u32>(&b)).expect("B");

    assert_eq!(*b, 10);
}

#[test]
fn named_dependencies_are_injected_by_name() {
    let host = Component::labeled_value("Host", "localhost".to_string());
    let port = Component::labeled_value("Port", 5432_u16);
    let url = Component::factory(|injected: Injected| {
        let host = injected.named::<String>("host")?;
        let port = injected.named::<u16>("port")?;
        Ok::<_, RequireError>(format!("{host}:{port}"))
    })
    .label("Url")
    .depends_on(Dependencies::named([("port", &port), ("host", &host)]))
    .build();
    let resolver = Resolver::new();

    let url = block_on(resolver.get_as::<String>(&url)).expect("Url");

    assert_eq!(*url, "localhost:5432");
}

#[test]
fn value_components_resolve_to_themselves() {
    let shared = Arc::new(String::from("config"));
    let value = Component::from_instance(Some("Config".into()), Instance::from_arc(shared.clone()));
    let resolver = Resolver::new();

    let resolved = block_on(resolver.get_as::<String>(&value)).expect("value");

    assert!(Arc::ptr_eq(&resolved, &shared));
    assert!(resolver.contains(&value));
}

#[derive(Debug, thiserror::Error)]
#[error("connection refused by {0}")]
struct ConnectionRefused(&'static str);

#[test]
fn factory_errors_pass_through_unchanged() {
    let database = Component::factory(|_| Err::<(), _>(ConnectionRefused("db.internal")))
        .label("Database")
        .build();
    let repository = Component::factory(|_| Ok::<_, Infallible>(()))
        .label("Repository")
        .depends_on(&database)
        .build();
    let resolver = Resolver::new();

    let err = block_on(resolver.get(&repository)).unwrap_err();

    assert_eq!(err.to_string(), "connection refused by db.internal");
    assert_eq!(err.component(), Some("Database"));
    let original = err
        .factory_error()
        .and_then(|error| error.downcast_ref::<ConnectionRefused>())
        .expect("original error");
    assert_eq!(original.0, "db.internal");
    assert!(!resolver.contains(&repository));
}

#[test]
fn failure_does_not_poison_later_calls() {
    let attempts = counter();
    let counted_attempts = attempts.clone();
    let flaky = Component::factory(move |_| {
        match counted_attempts.fetch_add(1, Ordering::SeqCst) {
            0 => Err("first attempt fails"),
            _ => Ok("second attempt works"),
        }
    })
    .label("Flaky")
    .build();
    let resolver = Resolver::new();

    assert!(block_on(resolver.get(&flaky)).is_err());
    let instance = block_on(resolver.get(&flaky)).expect("retry");

    assert_eq!(*instance.downcast::<&str>().expect("str"), "second attempt works");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn already_resolved_work_survives_a_failure() {
    let calls = counter();
    let a = counted("A", &calls);
    let failing = Component::factory(|_| Err::<(), _>("boom"))
        .label("Failing")
        .depends_on(&a)
        .build();
    let resolver = Resolver::new();

    assert!(block_on(resolver.get(&failing)).is_err());

    assert!(resolver.contains(&a));
    assert!(!resolver.contains(&failing));
}

#[test]
fn overlapping_gets_share_one_instantiation() {
    let calls = counter();
    let shared = slow("Shared", Duration::from_millis(30), 7_u8, &calls);
    let resolver = Resolver::new();

    let (first, second) = block_on(async { join!(resolver.get(&shared), resolver.get(&shared)) });

    let first = first.expect("first caller");
    let second = second.expect("second caller");
    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn overlapping_gets_share_one_failure() {
    let calls = counter();
    let late = slow("Late", Duration::from_millis(300), 0_u8, &calls);
    let resolver = resolver_with_timeout(Duration::from_millis(20));

    let (first, second) = block_on(async { join!(resolver.get(&late), resolver.get(&late)) });

    assert!(matches!(first, Err(ResolveError::InstantiationTimeout { .. })));
    assert!(matches!(second, Err(ResolveError::InstantiationTimeout { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_during_a_running_get() {
    let calls = counter();
    let slow_component = slow("Slow", Duration::from_millis(50), 1_u8, &calls);
    let resolver = Resolver::new();

    let (resolved, ()) = block_on(async {
        join!(resolver.get(&slow_component), async {
            after(Duration::from_millis(10), ()).await;
            resolver.clear();
        })
    });

    // The running call finishes against the cache it started with
    resolved.expect("unaffected by clear");
    assert!(!resolver.contains(&slow_component));

    block_on(resolver.get(&slow_component)).expect("again");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn provide_during_a_running_get_wins() {
    let calls = counter();
    let slow_component = slow("Slow", Duration::from_millis(50), 1_u8, &calls);
    let resolver = Resolver::new();

    let (resolved, ()) = block_on(async {
        join!(resolver.get(&slow_component), async {
            after(Duration::from_millis(10), ()).await;
            resolver.provide(&slow_component, 2_u8);
        })
    });

    // Roots are read back from the cache, so the running call sees the provided value too
    assert_eq!(*resolved.expect("provided value").downcast::<u8>().expect("u8"), 2);
    let cached = block_on(resolver.get_as::<u8>(&slow_component)).expect("provided");
    assert_eq!(*cached, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_get_leaves_nothing_pending() {
    let calls = counter();
    let component = slow("Slow", Duration::from_millis(30), 1_u8, &calls);
    let resolver = resolver_with_timeout(Duration::from_millis(60));

    // Polled once, then given up on while the factory runs
    assert!(resolver.get(&component).now_or_never().is_none());
    assert_eq!(format!("{resolver:?}"), "Resolver");

    // Longer than the timeout - a restarted instantiation gets a fresh one
    thread::sleep(Duration::from_millis(100));
    let instance = block_on(resolver.get(&component)).expect("restarted");

    assert_eq!(*instance.downcast::<u8>().expect("u8"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn resolvers_are_independent() {
    let calls = counter();
    let a = counted("A", &calls);
    let first = Resolver::new();
    let second = Resolver::new();

    let from_first = block_on(first.get(&a)).expect("A");
    let from_second = block_on(second.get(&a)).expect("A");

    assert!(!from_first.ptr_eq(&from_second));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn resolver_is_shareable_between_threads() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<Resolver>();

    let calls = counter();
    let a = counted("A", &calls);
    let resolver = Resolver::new();

    let handle = {
        let resolver = resolver.clone();
        let a = a.clone();
        thread::spawn(move || block_on(resolver.get(&a)).map(|instance| instance.type_name()))
    };

    assert_eq!(handle.join().expect("thread").expect("A"), "&str");
    assert!(resolver.contains(&a));
}
