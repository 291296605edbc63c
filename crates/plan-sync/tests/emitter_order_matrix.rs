use std::sync::{Arc, Mutex};

use plan_sync::{DependencySpec, EmitError, TopoEmitter};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recording(log: &Log, name: &'static str) -> impl Fn(&'static str) -> futures_util::future::Ready<()> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_origin| {
        log.lock().expect("log lock").push(name);
        futures_util::future::ready(())
    }
}

#[tokio::test]
async fn before_all_listener_runs_first_regardless_of_registration_order() {
    // L1 has no dependencies, L2 depends on L1, L3 runs before all
    // dependency-based listeners. Expected order: L3, L1, L2.
    let registrations: Vec<Vec<&'static str>> = vec![
        vec!["L1", "L2", "L3"],
        vec!["L3", "L2", "L1"],
        vec!["L2", "L3", "L1"],
    ];

    for order in registrations {
        let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        for name in &order {
            match *name {
                "L1" => {
                    emitter.subscribe("L1", DependencySpec::Explicit(vec![]), recording(&log, "L1"));
                }
                "L2" => {
                    emitter.subscribe("L2", DependencySpec::Explicit(vec!["L1"]), recording(&log, "L2"));
                }
                _ => {
                    emitter.subscribe("L3", DependencySpec::BeforeAll, recording(&log, "L3"));
                }
            }
        }

        emitter.emit("test").await.expect("emit must succeed");
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["L3", "L1", "L2"],
            "registration order {order:?} must not affect execution order"
        );
    }
}

#[tokio::test]
async fn after_all_listener_runs_last() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe("teardown", DependencySpec::AfterAll, recording(&log, "teardown"));
    emitter.subscribe("a", DependencySpec::Explicit(vec![]), recording(&log, "a"));
    emitter.subscribe("b", DependencySpec::Explicit(vec!["a"]), recording(&log, "b"));

    emitter.emit("test").await.expect("emit must succeed");
    assert_eq!(*log.lock().expect("log lock"), vec!["a", "b", "teardown"]);
}

#[tokio::test]
async fn explicit_chain_follows_declared_dependencies() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe("c", DependencySpec::Explicit(vec!["b"]), recording(&log, "c"));
    emitter.subscribe("b", DependencySpec::Explicit(vec!["a"]), recording(&log, "b"));
    emitter.subscribe("a", DependencySpec::Explicit(vec![]), recording(&log, "a"));

    emitter.emit("test").await.expect("emit must succeed");
    assert_eq!(*log.lock().expect("log lock"), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn ties_break_by_registration_order() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe("x", DependencySpec::Explicit(vec![]), recording(&log, "x"));
    emitter.subscribe("y", DependencySpec::Explicit(vec![]), recording(&log, "y"));
    emitter.subscribe("z", DependencySpec::Explicit(vec![]), recording(&log, "z"));

    emitter.emit("test").await.expect("emit must succeed");
    assert_eq!(*log.lock().expect("log lock"), vec!["x", "y", "z"]);
}

#[tokio::test]
async fn dependencies_on_unregistered_identities_are_ignored() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe("a", DependencySpec::Explicit(vec!["never-subscribed"]), recording(&log, "a"));

    emitter.emit("test").await.expect("unknown dependency must not fail the sort");
    assert_eq!(*log.lock().expect("log lock"), vec!["a"]);
}

#[tokio::test]
async fn dependency_cycle_fails_the_emit() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe("a", DependencySpec::Explicit(vec!["b"]), recording(&log, "a"));
    emitter.subscribe("b", DependencySpec::Explicit(vec!["a"]), recording(&log, "b"));

    let result = emitter.emit("test").await;
    assert_eq!(result, Err(EmitError::Cycle));
    assert!(
        log.lock().expect("log lock").is_empty(),
        "no listener may run when the dependency graph has a cycle"
    );
}

#[tokio::test]
async fn unsubscribe_removes_the_listener_and_reorders() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let sub = emitter.subscribe("a", DependencySpec::Explicit(vec![]), recording(&log, "a"));
    emitter.subscribe("b", DependencySpec::Explicit(vec!["a"]), recording(&log, "b"));

    emitter.emit("test").await.expect("emit must succeed");
    assert_eq!(*log.lock().expect("log lock"), vec!["a", "b"]);

    sub.unsubscribe();
    assert_eq!(emitter.listener_count(), 1);

    log.lock().expect("log lock").clear();
    emitter.emit("test").await.expect("emit must succeed");
    assert_eq!(*log.lock().expect("log lock"), vec!["b"]);
}

#[tokio::test]
async fn origin_is_handed_to_every_listener() {
    let emitter: TopoEmitter<&'static str> = TopoEmitter::new();
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    emitter.subscribe("a", DependencySpec::Explicit(vec![]), move |origin| {
        let s = Arc::clone(&s);
        async move {
            s.lock().expect("seen lock").push(origin);
        }
    });

    emitter.emit("the-origin").await.expect("emit must succeed");
    assert_eq!(*seen.lock().expect("seen lock"), vec!["the-origin"]);
}
