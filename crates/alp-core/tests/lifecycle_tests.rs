//! Lifecycle integration tests: mounting, queued calls, rebinding, failure
//! and disconnect, driven through the public `App` surface.

use alp_core::{
    AlpError, App, Component, ComponentDescriptor, ErrorKind, Found, Instance, Markup, Occasion, Phase, TextBox,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

fn push(log: &Log, entry: String) {
    log.lock().expect("log lock").push(entry);
}

fn no_attrs() -> std::iter::Empty<(String, String)> {
    std::iter::empty()
}

fn empty_template(_path: &str) -> Markup {
    Markup::element("div")
}

// =============================================================================
// TEST COMPONENTS
// =============================================================================

/// Logs hooks and method calls; init optionally waits on a gate.
struct Tracer {
    log: Log,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl Component for Tracer {
    async fn init(&self, instance: &Instance) -> Result<(), AlpError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        push(&self.log, "init".into());
        self.refresh(instance).await
    }

    async fn refresh(&self, instance: &Instance) -> Result<(), AlpError> {
        push(&self.log, format!("refresh {}", instance.path()));
        Ok(())
    }

    async fn on_ping(&self, instance: &Instance, occasion: Occasion, payload: Option<&Value>) {
        let who = instance.attribute("id").unwrap_or_default();
        let payload = payload.map(Value::to_string).unwrap_or_default();
        push(&self.log, format!("{who} {occasion} {payload}").trim_end().to_string());
    }

    async fn invoke(&self, instance: &Instance, method: &str, args: Vec<Value>) -> Result<Value, AlpError> {
        push(&self.log, format!("{method}{}", Value::Array(args)));
        if method == "chain" {
            // Arrives while the queue drains: must run after what is already queued.
            let handle = instance.app()?.handle(instance.host())?;
            handle.call("tail", vec![]).await?;
        }
        if method == "await_self" {
            // Replayed from the queue: waiting on its own host must not stall the drain.
            let ready = instance.app()?.handle(instance.host())?.ready().await?;
            push(&self.log, format!("await_self saw {}", ready.phase() == Phase::Ready));
        }
        Ok(Value::Null)
    }
}

fn tracer(log: &Log, gate: Option<Arc<Notify>>) -> ComponentDescriptor {
    let log = Arc::clone(log);
    ComponentDescriptor::new("tracer", empty_template, move || Tracer {
        log: Arc::clone(&log),
        gate: gate.clone(),
    })
}

struct Broken;

#[async_trait]
impl Component for Broken {
    async fn init(&self, _instance: &Instance) -> Result<(), AlpError> {
        Err(AlpError::Storage("disk on fire".into()))
    }
}

/// Waits in init for its nested `alp-text` to become ready.
struct Parent {
    child_path: Arc<Mutex<Option<String>>>,
}

fn parent_template(_path: &str) -> Markup {
    Markup::element("section").child(Markup::element("alp-text").attr("path", "inner"))
}

#[async_trait]
impl Component for Parent {
    async fn init(&self, instance: &Instance) -> Result<(), AlpError> {
        let child = match instance.find("alp-text")? {
            Some(Found::Component(child)) => child,
            Some(Found::Pending(handle)) => handle.await?,
            _ => return Err(AlpError::UnknownComponent("alp-text".into())),
        };
        *self.child_path.lock().expect("lock") = Some(child.canonical_path());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn mount_pings_then_announces_ready() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    app.connect(app.root(), "alp-tracer", [("id", "a"), ("path", "shared")])
        .await
        .expect("connect a");
    app.connect(app.root(), "alp-tracer", [("id", "b"), ("path", "shared")])
        .await
        .expect("connect b");

    assert_eq!(
        entries(&log),
        vec![
            "a mount",
            "init",
            "refresh shared",
            r#"a ready {"id":"a","path":"shared"}"#,
            "b mount",
            "init",
            "refresh shared",
            r#"a ready {"id":"b","path":"shared"}"#,
            r#"b ready {"id":"b","path":"shared"}"#,
        ]
    );
    assert_eq!(app.registry().instances("AlpDB/alp:shared").len(), 2);
}

#[tokio::test]
async fn queued_calls_replay_in_order() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    let host = app.create_element("alp-tracer", [("id", "q")]);
    let handle = app.handle(host).expect("handle");
    let other = app.handle(host).expect("second handle");

    assert_eq!(handle.call("m1", vec![json!(1)]).await.expect("m1"), None);
    assert_eq!(other.call("chain", vec![]).await.expect("chain"), None);
    assert_eq!(handle.call("m2", vec![json!(2)]).await.expect("m2"), None);
    assert_eq!(handle.pending_calls(), 3);
    assert!(!handle.is_ready());

    app.attach(app.root(), host).await.expect("attach");

    let calls: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| !e.starts_with("q ") && e != "init" && !e.starts_with("refresh"))
        .collect();
    assert_eq!(calls, vec!["m1[1]", "chain[]", "m2[2]", "tail[]"]);
    assert!(handle.is_ready());
    assert_eq!(handle.pending_calls(), 0);

    let direct = handle.call("m3", vec![]).await.expect("m3");
    assert_eq!(direct, Some(Value::Null));
}

#[tokio::test]
async fn waiters_resolve_after_init() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    let gate = Arc::new(Notify::new());
    app.define(tracer(&log, Some(Arc::clone(&gate)))).await.expect("define");

    let host = app.create_element("alp-tracer", [("id", "w")]);
    let handle = app.handle(host).expect("handle");

    let root = app.root();
    let (attached, ready) = tokio::join!(app.attach(root, host), async {
        while app.instance(host).is_none() {
            tokio::task::yield_now().await;
        }
        let mounting = app.instance(host).expect("mounted");
        assert_eq!(mounting.phase(), Phase::Mounting);
        handle.call("early", vec![]).await.expect("queued");
        gate.notify_one();
        handle.clone().await
    });

    attached.expect("attach");
    let instance = ready.expect("ready");
    assert_eq!(instance.host(), host);
    assert_eq!(instance.phase(), Phase::Ready);
    assert!(entries(&log).contains(&"early[]".to_string()));
}

#[tokio::test]
async fn init_failure_rejects_waiters_and_drops_queue() {
    let app = App::in_memory().expect("app");
    app.define(ComponentDescriptor::new("broken", empty_template, || Broken))
        .await
        .expect("define");

    let host = app.create_element("alp-broken", no_attrs());
    let handle = app.handle(host).expect("handle");
    assert_eq!(handle.call("never", vec![]).await.expect("queued"), None);

    let root = app.root();
    let (waited, attached) = tokio::join!(handle.ready(), app.attach(root, host));

    let err = attached.expect_err("init fails");
    assert!(matches!(err, AlpError::InitFailed { ref tag, .. } if tag == "broken"));
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
    assert!(err.to_string().contains("disk on fire"));
    assert!(matches!(waited, Err(AlpError::InitFailed { .. })));

    assert_eq!(handle.pending_calls(), 0);
    assert!(matches!(handle.call("later", vec![]).await, Err(AlpError::InitFailed { .. })));
    assert!(app.instance(host).is_none());
    assert!(app.registry().is_empty());
    assert!(app.contains(host));
}

#[tokio::test]
async fn rebind_moves_binding_not_data() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");
    let host = app
        .connect(app.root(), "alp-tracer", [("id", "x"), ("path", "a")])
        .await
        .expect("connect");
    let instance = app.instance(host).expect("mounted");
    log.lock().expect("lock").clear();

    instance.use_path("b").await.expect("rebind");
    assert!(!app.registry().is_bound("AlpDB/alp:a"));
    assert_eq!(app.registry().instances("AlpDB/alp:b").len(), 1);
    assert_eq!(instance.phase(), Phase::Ready);
    assert_eq!(
        entries(&log),
        vec![r#"x path-changed {"from":"a","to":"b"}"#, "refresh b"]
    );
    assert_eq!(app.records().load_one("b").await.expect("load"), None);

    log.lock().expect("lock").clear();
    instance.use_path("  AlpDB/alp:b ").await.expect("same path");
    assert_eq!(entries(&log), vec!["refresh AlpDB/alp:b"]);

    instance.use_path("").await.expect("default");
    assert_eq!(instance.path(), "alp.tracer");
    assert!(app.registry().is_bound("AlpDB/alp:alp.tracer"));
    assert_eq!(app.registry().len(), 1);
}

#[tokio::test]
async fn parent_init_waits_for_child() {
    let app = App::in_memory().expect("app");
    app.define_builtins().await.expect("builtins");
    let seen = Arc::new(Mutex::new(None));
    let shared = Arc::clone(&seen);
    app.define(ComponentDescriptor::new("parent", parent_template, move || Parent {
        child_path: Arc::clone(&shared),
    }))
    .await
    .expect("define");

    let host = app.connect(app.root(), "alp-parent", no_attrs()).await.expect("connect");

    assert_eq!(*seen.lock().expect("lock"), Some("AlpDB/alp:inner".to_string()));
    assert!(app.handle(host).expect("handle").is_ready());
    let Some(Found::Component(child)) = app.find("alp-text").expect("find") else {
        unreachable!("child is ready once the parent is");
    };
    assert!(child.component::<TextBox>().is_some());
}

#[tokio::test]
async fn disconnect_releases_everything() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    let section = app.connect(app.root(), "section", no_attrs()).await.expect("section");
    let first = app
        .connect(section, "alp-tracer", [("id", "one"), ("path", "p")])
        .await
        .expect("first");
    app.connect(section, "alp-tracer", [("id", "two"), ("path", "q")])
        .await
        .expect("second");
    let undefined = app
        .connect(section, "alp-later", no_attrs())
        .await
        .expect("undefined component");
    let instance = app.instance(first).expect("mounted");
    let handle = app.handle(undefined).expect("handle");

    let (waited, removed) = tokio::join!(handle.ready(), async { app.disconnect(section) });
    removed.expect("disconnect");

    assert!(matches!(waited, Err(AlpError::Detached(id)) if id == undefined.0));
    assert!(app.registry().is_empty());
    assert!(app.instances().is_empty());
    assert_eq!(instance.phase(), Phase::Unmounted);
    assert!(matches!(instance.use_path("z").await, Err(AlpError::Detached(_))));
    assert!(!app.registry().is_bound("AlpDB/alp:z"));

    log.lock().expect("lock").clear();
    app.records().save_one("p", json!(1)).await.expect("save");
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn replayed_call_can_wait_for_its_own_host() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    let host = app.create_element("alp-tracer", [("id", "s")]);
    let handle = app.handle(host).expect("handle");
    assert_eq!(handle.call("await_self", vec![]).await.expect("queued"), None);

    app.attach(app.root(), host).await.expect("attach");

    assert!(entries(&log).contains(&"await_self saw true".to_string()));
    assert!(handle.is_ready());
    assert_eq!(handle.pending_calls(), 0);
}

#[tokio::test]
async fn moving_under_a_detached_parent_unmounts() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");
    let host = app
        .connect(app.root(), "alp-tracer", [("id", "m"), ("path", "p")])
        .await
        .expect("connect");
    let instance = app.instance(host).expect("mounted");

    let holder = app.create_element("div", no_attrs());
    app.attach(holder, host).await.expect("move away");

    assert!(!app.is_connected(host));
    assert!(app.instance(host).is_none());
    assert_eq!(instance.phase(), Phase::Unmounted);
    assert!(!app.registry().is_bound("AlpDB/alp:p"));
    assert!(!app.handle(host).expect("handle").is_ready());
    log.lock().expect("lock").clear();
    app.records().save_one("p", json!(1)).await.expect("save");
    assert!(entries(&log).is_empty());

    app.attach(app.root(), holder).await.expect("reconnect");
    let remounted = app.instance(host).expect("remounted");
    assert_ne!(remounted.id(), instance.id());
    assert!(app.registry().is_bound("AlpDB/alp:p"));
    assert_eq!(app.registry().len(), 1);
    assert_eq!(app.children(host).len(), 1);
}

#[tokio::test]
async fn queued_calls_survive_a_detached_move() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    let host = app.create_element("alp-tracer", [("id", "d")]);
    let handle = app.handle(host).expect("handle");
    handle.call("early", vec![]).await.expect("queued");
    let holder = app.create_element("div", no_attrs());
    app.attach(holder, host).await.expect("detached move");
    assert_eq!(handle.pending_calls(), 1);

    app.attach(app.root(), holder).await.expect("connect");
    assert!(entries(&log).contains(&"early[]".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rebind_racing_disconnect_leaves_no_binding() {
    let app = App::in_memory().expect("app");
    let log = Log::default();
    app.define(tracer(&log, None)).await.expect("define");

    for round in 0..64 {
        let host = app
            .connect(app.root(), "alp-tracer", [("path", format!("r{round}"))])
            .await
            .expect("connect");
        let instance = app.instance(host).expect("mounted");
        let rebind = tokio::spawn(async move { instance.use_path(&format!("moved{round}")).await });
        let remover = app.clone();
        let removal = tokio::spawn(async move { remover.disconnect(host) });

        removal.await.expect("join").expect("disconnect");
        let rebound = rebind.await.expect("join");
        assert!(rebound.is_ok() || matches!(rebound, Err(AlpError::Detached(_))));
        assert!(
            app.registry().is_empty(),
            "round {round} left {:?}",
            app.registry().bound_paths()
        );
    }
}

#[tokio::test]
async fn event_dispatch_reaches_bound_method() {
    let app = App::in_memory().expect("app");
    app.define_builtins().await.expect("builtins");
    let host = app
        .connect(app.root(), "alp-text", [("path", "memo")])
        .await
        .expect("connect");
    let instance = app.instance(host).expect("mounted");
    instance.invoke("set", vec![json!("remember")]).await.expect("set");
    assert_eq!(
        app.records().load_one("memo").await.expect("load"),
        Some(json!({"text": "remember"}))
    );

    let Some(found) = instance.find("button").expect("find") else {
        unreachable!("template has a delete button");
    };
    app.dispatch(found.element(), "click").await.expect("dispatch");

    assert_eq!(app.records().load_one("memo").await.expect("load"), None);
    let text = instance.component::<TextBox>().expect("text box").text();
    assert_eq!(text, "");
}

#[tokio::test]
async fn instances_outlive_the_app_safely() {
    let app = App::in_memory().expect("app");
    app.define_builtins().await.expect("builtins");
    let host = app
        .connect(app.root(), "alp-text", no_attrs())
        .await
        .expect("connect");
    let instance = app.instance(host).expect("mounted");
    drop(app);

    assert!(matches!(instance.app(), Err(AlpError::AppClosed)));
    assert!(matches!(instance.save(json!({"text": "x"})).await, Err(AlpError::AppClosed)));
}
