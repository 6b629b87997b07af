//! Integration Tests for the Weft Runtime
//!
//! These tests drive the reactive system, the scheduler and the reconciler
//! together through the public API, asserting against the operation log of
//! the in-memory host.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_core::prelude::*;
use weft_core::render::HostOp;

fn manual_runtime() -> Runtime {
    Runtime::with_config(RuntimeConfig::manual()).unwrap()
}

fn mount(rt: &Runtime) -> (Rc<MemoryHost>, Renderer, NodeId) {
    let host = Rc::new(MemoryHost::new());
    let renderer = Renderer::new(rt.clone(), host.clone());
    let root = host.create_root();
    (host, renderer, root)
}

fn keyed(keys: &[&str]) -> VNodeRef {
    let items = keys
        .iter()
        .map(|key| h("li", props([("key", *key)]), *key))
        .collect::<Vec<_>>();
    h("ul", Props::new(), items)
}

fn count_ops(ops: &[HostOp], pred: impl Fn(&HostOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

// ----------------------------------------------------------------------------
// Reactivity
// ----------------------------------------------------------------------------

/// Test that wrapping is idempotent and stable across calls.
#[test]
fn wrapping_is_idempotent() {
    let rt = Runtime::new();
    let raw = RawObject::new();

    let first = rt.reactive(Value::from(raw.clone()));
    let second = rt.reactive(Value::from(raw));
    let nested = rt.reactive(first.clone());

    assert!(first.same(&second));
    assert!(first.same(&nested));
    assert!(is_reactive(&first));
}

/// Test that an effect re-runs once per write to the key it read, and never
/// for unrelated keys.
#[test]
fn effect_tracks_only_the_keys_it_reads() {
    let rt = Runtime::new();
    let state = rt.reactive_object([("count", 0), ("other", 0)]);
    let runs = Rc::new(Cell::new(0));

    let (s, r) = (state.clone(), runs.clone());
    let _effect = rt.effect(move || {
        s.get("count");
        r.set(r.get() + 1);
    });

    state.set("count", 1);
    assert_eq!(runs.get(), 2);

    state.set("other", 1);
    state.set("other", 2);
    assert_eq!(runs.get(), 2);
}

/// Test that a computed value recomputes once after many writes.
#[test]
fn computed_coalesces_writes() {
    let rt = Runtime::new();
    let state = rt.reactive_object([("n", 0)]);
    let calls = Rc::new(Cell::new(0));

    let (s, c) = (state.clone(), calls.clone());
    let squared = rt.computed(move || {
        c.set(c.get() + 1);
        let n = s.get("n").as_f64().unwrap_or(0.0);
        n * n
    });
    assert_eq!(squared.get(), 0.0);

    for n in 1..=25 {
        state.set("n", n);
    }
    assert_eq!(calls.get(), 1);
    assert_eq!(squared.get(), 625.0);
    assert_eq!(calls.get(), 2);
}

/// Test that nested reactive objects are tracked through their parent.
#[test]
fn nested_objects_are_reactive() {
    let rt = Runtime::new();
    let user = RawObject::from_iter([("name", "ada")]);
    let state = rt.reactive_object([("user", Value::from(user))]);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (s, log) = (state.clone(), seen.clone());
    let _effect = rt.effect(move || {
        let name = s
            .get("user")
            .as_reactive()
            .map(|user| user.get("name"))
            .unwrap_or_default();
        log.borrow_mut().push(name.to_string());
    });

    if let Some(user) = state.get("user").as_reactive() {
        user.set("name", "grace");
    }
    assert_eq!(*seen.borrow(), vec!["ada".to_string(), "grace".to_string()]);
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Test that a job queued twice before a flush runs once.
#[test]
fn queued_job_runs_once_per_flush() {
    let rt = manual_runtime();
    let runs = Rc::new(Cell::new(0));

    let r = runs.clone();
    let job = Job::new(move || r.set(r.get() + 1));
    rt.queue_job(job.clone());
    rt.queue_job(job);

    rt.flush_jobs().unwrap();
    assert_eq!(runs.get(), 1);
}

/// Test that jobs flush in id order with unordered jobs last.
#[test]
fn jobs_flush_in_id_order() {
    let rt = manual_runtime();
    let order = Rc::new(RefCell::new(Vec::new()));

    let push = |label: &'static str| {
        let order = order.clone();
        move || order.borrow_mut().push(label)
    };
    rt.queue_job(Job::new(push("none")));
    rt.queue_job(Job::with_id(3, push("3")));
    rt.queue_job(Job::with_id(1, push("1")));
    rt.queue_job(Job::with_id(2, push("2")));

    rt.flush_jobs().unwrap();
    assert_eq!(*order.borrow(), vec!["1", "2", "3", "none"]);
}

/// Test that a failing job is reported without stopping the others.
#[test]
fn failing_job_is_isolated() {
    let rt = manual_runtime();
    let ran = Rc::new(Cell::new(false));

    let r = ran.clone();
    rt.queue_job(Job::with_id(1, || panic!("broken job")));
    rt.queue_job(Job::with_id(2, move || r.set(true)));

    match rt.flush_jobs() {
        Err(Error::Flush(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].job_id, Some(1));
            assert!(failures[0].message.contains("broken job"));
        }
        other => panic!("expected a flush error, got {other:?}"),
    }
    assert!(ran.get());
    assert_eq!(rt.scheduler().pending(), 0);
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

/// Test that moving one keyed node issues a single host move.
#[test]
fn keyed_reorder_moves_one_node() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);

    renderer.render(Some(keyed(&["a", "b", "c", "d"])), root);
    let ul = host.children(root)[0];
    let nodes = host.children(ul);
    host.clear_ops();

    renderer.render(Some(keyed(&["a", "c", "d", "b"])), root);
    let ops = host.take_ops();

    assert_eq!(host.text_content(root), "acdb");
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::Insert { .. })), 1);
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::CreateElement { .. })), 0);
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::Remove { .. })), 0);
    assert!(matches!(ops[0], HostOp::Insert { node, .. } if node == nodes[1]));
}

/// Test appending and removing at the end of a keyed list.
#[test]
fn keyed_append_and_remove() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);

    renderer.render(Some(keyed(&["a", "b"])), root);
    let ul = host.children(root)[0];
    let before = host.children(ul);
    host.clear_ops();

    renderer.render(Some(keyed(&["a", "b", "c"])), root);
    let ops = host.take_ops();
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::CreateElement { .. })), 1);
    assert_eq!(host.children(ul)[..2], before[..]);

    renderer.render(Some(keyed(&["a", "b"])), root);
    let ops = host.take_ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::Remove { .. }));
    assert_eq!(host.children(ul), before);
}

/// Test that a full reversal keeps every host node.
#[test]
fn keyed_reverse_reuses_nodes() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);

    renderer.render(Some(keyed(&["a", "b", "c", "d", "e"])), root);
    let ul = host.children(root)[0];
    let mut nodes = host.children(ul);
    host.clear_ops();

    renderer.render(Some(keyed(&["e", "d", "c", "b", "a"])), root);
    let ops = host.take_ops();

    nodes.reverse();
    assert_eq!(host.children(ul), nodes);
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::Insert { .. })), 4);
    assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::CreateElement { .. })), 0);
}

/// Test that unkeyed children are patched by position.
#[test]
fn unkeyed_positional_reuse() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);

    renderer.render(
        Some(h(
            "div",
            Props::new(),
            vec![h("div", Props::new(), "A"), h("div", Props::new(), "B")],
        )),
        root,
    );
    let outer = host.children(root)[0];
    let before = host.children(outer);

    renderer.render(
        Some(h(
            "div",
            Props::new(),
            vec![h("div", Props::new(), "A'"), h("div", Props::new(), "B'")],
        )),
        root,
    );
    assert_eq!(host.children(outer), before);

    renderer.render(
        Some(h(
            "div",
            Props::new(),
            vec![h("div", Props::new(), "A'"), h("span", Props::new(), "C")],
        )),
        root,
    );
    let after = host.children(outer);
    assert_eq!(after[0], before[0]);
    assert_ne!(after[1], before[1]);
    assert_eq!(host.text_content(root), "A'C");
}

/// Test that prop diffs only touch changed keys.
#[test]
fn prop_diff_is_minimal() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);

    renderer.render(Some(h("div", props([("a", 1), ("b", 2)]), ())), root);
    host.clear_ops();

    renderer.render(Some(h("div", props([("a", 1), ("c", 3)]), ())), root);
    let ops = host.take_ops();

    let patched: Vec<(String, bool)> = ops
        .iter()
        .filter_map(|op| match op {
            HostOp::PatchProp { key, next, .. } => Some((key.clone(), next.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(patched, vec![("c".to_string(), true), ("b".to_string(), false)]);
}

/// Test that event handler props can be dispatched through the host.
#[test]
fn handler_props_dispatch() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);
    let clicks = Rc::new(Cell::new(0));

    let c = clicks.clone();
    let on_click = Handler::new(move |_| c.set(c.get() + 1));
    renderer.render(Some(h("button", props([("onClick", Value::from(on_click))]), "go")), root);

    let button = host.children(root)[0];
    assert!(host.dispatch(button, "click", &[]));
    assert_eq!(clicks.get(), 1);
    assert_eq!(host.serialize(root), "<button>go</button>");
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

/// Test that a parent and its child re-render in one flush, parent first.
#[test]
fn parent_updates_before_child() {
    let rt = manual_runtime();
    let (host, renderer, root) = mount(&rt);
    let order = Rc::new(RefCell::new(Vec::new()));
    let state = rt.reactive_object([("parent", 0), ("child", 0)]);

    let (s, log) = (state.clone(), order.clone());
    let child = Rc::new(ComponentDef::new("Child").with_render(move |ctx| {
        log.borrow_mut().push("child");
        text(format!("{}:{}", ctx.prop("label").unwrap_or_default(), s.get("child")))
    }));

    let (s, log, c) = (state.clone(), order.clone(), child.clone());
    let parent = Rc::new(ComponentDef::new("Parent").with_render(move |_| {
        log.borrow_mut().push("parent");
        let label = s.get("parent");
        h("div", Props::new(), vec![h(&c, props([("label", label)]), ())])
    }));

    renderer.create_app(parent).mount(root).unwrap();
    assert_eq!(host.text_content(root), "0:0");
    order.borrow_mut().clear();

    state.set("child", 1);
    state.set("parent", 1);
    rt.flush_jobs().unwrap();

    assert_eq!(host.text_content(root), "1:1");
    assert_eq!(*order.borrow(), vec!["parent", "child"]);
}

/// Test that keyed component children keep their instances when reordered.
#[test]
fn keyed_components_keep_instances() {
    let rt = manual_runtime();
    let (host, renderer, root) = mount(&rt);
    let item = Rc::new(ComponentDef::functional("Item", |ctx| {
        h("li", Props::new(), ctx.prop("label").unwrap_or_default())
    }));

    let list = |labels: &[&str]| {
        let children = labels
            .iter()
            .map(|label| h(&item, props([("key", *label), ("label", *label)]), ()))
            .collect::<Vec<_>>();
        h("ul", Props::new(), children)
    };

    let first = list(&["x", "y", "z"]);
    renderer.render(Some(first.clone()), root);
    let instances: Vec<_> = first
        .children()
        .as_nodes()
        .iter()
        .filter_map(|node| node.component())
        .collect();

    let second = list(&["z", "x", "y"]);
    renderer.render(Some(second.clone()), root);
    assert_eq!(host.text_content(root), "zxy");

    let reordered: Vec<_> = second
        .children()
        .as_nodes()
        .iter()
        .filter_map(|node| node.component())
        .collect();
    assert!(Rc::ptr_eq(&reordered[0], &instances[2]));
    assert!(Rc::ptr_eq(&reordered[1], &instances[0]));
    assert!(Rc::ptr_eq(&reordered[2], &instances[1]));
}

/// Test that state written by a child's mounted hook re-renders the parent
/// that is still mounting it.
#[test]
fn child_mounted_hook_updates_parent() {
    let rt = manual_runtime();
    let (host, renderer, root) = mount(&rt);
    let ready = rt.create_ref("no");

    let r = ready.clone();
    let child = Rc::new(ComponentDef::new("Child").with_setup(move |_, ctx| {
        let r = r.clone();
        ctx.runtime().on_mounted(move || r.set("yes"));
        SetupResult::render(|_| text("child"))
    }));

    let (r, c) = (ready.clone(), child.clone());
    let parent = Rc::new(ComponentDef::new("Parent").with_render(move |_| {
        let children = vec![text(r.get().to_string()), text("|"), h(&c, Props::new(), ())];
        h("div", Props::new(), children)
    }));

    renderer.create_app(parent).mount(root).unwrap();
    assert_eq!(rt.scheduler().pending(), 1);

    rt.flush_jobs().unwrap();
    assert_eq!(ready.get_untracked(), Value::from("yes"));
    assert_eq!(host.text_content(root), "yes|child");
}

/// Test that an event emitted from a child's setup reaches the parent and
/// re-renders it.
#[test]
fn child_setup_emit_updates_parent() {
    let rt = manual_runtime();
    let (host, renderer, root) = mount(&rt);
    let count = rt.create_ref(0);

    let child = Rc::new(ComponentDef::new("Child").with_setup(|_, ctx| {
        ctx.emit("ready", &[]);
        SetupResult::render(|_| text("c"))
    }));

    let (c, def) = (count.clone(), child.clone());
    let parent = Rc::new(ComponentDef::new("Parent").with_render(move |_| {
        let writer = c.clone();
        let on_ready = Handler::new(move |_| writer.set(1));
        let children = vec![
            text(c.get().to_string()),
            text("|"),
            h(&def, props([("onReady", on_ready)]), ()),
        ];
        h("div", Props::new(), children)
    }));

    renderer.create_app(parent).mount(root).unwrap();
    rt.flush_jobs().unwrap();

    assert_eq!(count.get_untracked(), Value::from(1));
    assert_eq!(host.text_content(root), "1|c");
}

/// Test the full loop: a ref write re-renders the component after one tick,
/// with a single host text update.
#[tokio::test]
async fn ref_write_updates_host_after_next_tick() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);
    let message = rt.create_ref("hello");

    let m = message.clone();
    let def = Rc::new(ComponentDef::new("Message").with_render(move |_| text(m.get().to_string())));
    let app = renderer.create_app(def);
    app.mount(root).unwrap();
    let instance = app.root_instance().unwrap();
    host.clear_ops();

    rt.run_until(async {
        message.set("world");
        assert!(rt.scheduler().is_flush_pending());
        rt.next_tick().await.unwrap();
    })
    .await;

    let ops = host.take_ops();
    assert_eq!(
        ops,
        vec![HostOp::SetText {
            node: host.children(root)[0],
            text: "world".to_string(),
        }]
    );
    assert_eq!(instance.render_count(), 2);
}

/// Test that many writes in one turn coalesce into one render.
#[tokio::test]
async fn writes_in_one_turn_render_once() {
    let rt = Runtime::new();
    let (host, renderer, root) = mount(&rt);
    let count = rt.create_ref(0);

    let c = count.clone();
    let def = Rc::new(ComponentDef::new("Count").with_render(move |_| text(c.get().to_string())));
    let app = renderer.create_app(def);
    app.mount(root).unwrap();
    let instance = app.root_instance().unwrap();

    let ticks = Rc::new(Cell::new(0));
    rt.run_until(async {
        for n in 1..=10 {
            count.set(n);
        }
        let t = ticks.clone();
        rt.next_tick_with(move || t.set(t.get() + 1)).await.unwrap();
    })
    .await;

    assert_eq!(host.text_content(root), "10");
    assert_eq!(instance.render_count(), 2);
    assert_eq!(ticks.get(), 1);
    assert_eq!(rt.scheduler().flush_count(), 1);
}

/// Test that unmounting the app tears down components and their effects.
#[test]
fn app_unmount_stops_reactivity() {
    let rt = manual_runtime();
    let (host, renderer, root) = mount(&rt);
    let count = rt.create_ref(0);
    let unmounted = Rc::new(Cell::new(false));

    let (c, flag) = (count.clone(), unmounted.clone());
    let def = Rc::new(ComponentDef::new("Root").with_setup(move |_, ctx| {
        let flag = flag.clone();
        ctx.runtime().on_unmounted(move || flag.set(true));
        let c = c.clone();
        SetupResult::render(move |_| text(c.get().to_string()))
    }));

    let app = renderer.create_app(def);
    app.mount(root).unwrap();
    app.unmount().unwrap();

    assert!(unmounted.get());
    assert!(host.children(root).is_empty());

    count.set(1);
    assert_eq!(rt.scheduler().pending(), 0);
    rt.collect_garbage();
    assert_eq!(rt.tracked_target_count(), 0);
}
