//! Edge case tests for sdc-engine

use std::cell::RefCell;
use std::rc::Rc;

use sdc_engine::dom::{DocumentFragment, InstanceRef, NodeId};
use sdc_engine::{
    App, AppConfig, ComponentId, ContentLoader, Controller, EngineError, EventTable, Hook, HookCx,
    LifecycleState, LoadFailure, LoadRequest, Propagation, StaticLoader,
};
use smol::future::{BoxedLocal, FutureExt};

type Log = Rc<RefCell<Vec<String>>>;

fn position(log: &Log, entry: &str) -> usize {
    log.borrow()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("`{entry}` not in {:?}", log.borrow()))
}

fn has(log: &Log, entry: &str) -> bool {
    log.borrow().iter().any(|e| e == entry)
}

fn app_with(loader: StaticLoader) -> (App, Rc<StaticLoader>) {
    let loader = Rc::new(loader);
    (App::new(AppConfig::default(), loader.clone()), loader)
}

fn start(app: &App, markup: &str) {
    app.append_markup(markup).unwrap();
    app.block_on(app.init());
}

fn only(app: &App, tag: &str) -> ComponentId {
    let found = app.components_of(tag);
    assert_eq!(found.len(), 1, "expected one <{tag}>");
    found[0]
}

/// Configurable controller; every hook appends `label:hook`
#[derive(Clone, Default)]
struct Probe {
    label: &'static str,
    url: Option<&'static str>,
    log: Log,
    veto: bool,
    detached: bool,
    slow_show: bool,
    selector: Option<&'static str>,
    flow: Propagation,
}

impl Probe {
    fn new(label: &'static str, url: Option<&'static str>, log: &Log) -> Self {
        Self {
            label,
            url,
            log: log.clone(),
            ..Self::default()
        }
    }

    fn record(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.label, hook));
    }
}

impl Controller for Probe {
    fn content_url(&self) -> Option<String> {
        self.url.map(str::to_string)
    }

    fn load_async(&self) -> bool {
        self.detached
    }

    fn events(&self) -> EventTable {
        match self.selector {
            Some(selector) => EventTable::new().on("click", selector, self.label),
            None => EventTable::new(),
        }
    }

    fn on_load(&mut self, _content: &mut DocumentFragment, _cx: &mut HookCx<'_>) -> Hook {
        self.record("load");
        Hook::Done
    }

    fn will_show(&mut self, _cx: &mut HookCx<'_>) -> Hook {
        if !self.slow_show {
            self.record("show");
            return Hook::Done;
        }
        let log = self.log.clone();
        let label = self.label;
        Hook::pending(async move {
            smol::future::yield_now().await;
            log.borrow_mut().push(format!("{label}:shown"));
        })
    }

    fn on_refresh(&mut self, _origin: ComponentId, _cx: &mut HookCx<'_>) -> Hook {
        self.record("refresh");
        Hook::Done
    }

    fn on_remove(&mut self, _cx: &mut HookCx<'_>) -> bool {
        self.record("remove");
        !self.veto
    }

    fn on_event(&mut self, handler: &str, _target: NodeId, _cx: &mut HookCx<'_>) -> Propagation {
        self.log.borrow_mut().push(format!("{}:{}", self.label, handler));
        if handler == "second" {
            Propagation::Continue
        } else {
            self.flow
        }
    }
}

/// Loader whose responses wait until the gate opens
struct GatedLoader {
    gate: smol::channel::Receiver<()>,
    markup: &'static str,
}

impl ContentLoader for GatedLoader {
    fn load(&self, _request: LoadRequest) -> BoxedLocal<Result<String, LoadFailure>> {
        let gate = self.gate.clone();
        let markup = self.markup.to_string();
        async move {
            let _ = gate.recv().await;
            Ok(markup)
        }
        .boxed_local()
    }
}

// ============================================================================
// REMOVAL
// ============================================================================

#[test]
fn test_child_veto_aborts_removal() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", "<veto-box></veto-box>"));
    let log = Log::default();
    let a = Probe::new("a", Some("/a"), &log);
    let mut veto = Probe::new("veto", None, &log);
    veto.veto = true;
    app.register("tag-a", move || a.clone());
    app.register("veto-box", move || veto.clone());
    start(&app, "<tag-a></tag-a>");

    let a = only(&app, "tag-a");
    let veto = only(&app, "veto-box");
    let container = app.container_of(a).unwrap();
    assert!(!app.remove(a));

    assert!(app.is_alive(a));
    assert!(app.is_alive(veto));
    assert!(app.tree().is_alive(container));
    assert!(has(&log, "veto:remove"));
    assert!(!has(&log, "a:remove"));
}

#[test]
fn test_own_veto_keeps_component() {
    let (app, _) = app_with(StaticLoader::new());
    let log = Log::default();
    let mut veto = Probe::new("veto", None, &log);
    veto.veto = true;
    app.register("veto-box", move || veto.clone());
    start(&app, "<veto-box></veto-box>");

    let id = only(&app, "veto-box");
    assert!(!app.remove(id));
    assert_eq!(app.state(id), LifecycleState::Active);
}

#[test]
fn test_safe_remove_overrides_veto() {
    let (app, _) = app_with(StaticLoader::new());
    let log = Log::default();
    let mut veto = Probe::new("veto", None, &log);
    veto.veto = true;
    app.register("veto-box", move || veto.clone());
    start(&app, "<veto-box></veto-box>");

    let id = only(&app, "veto-box");
    app.safe_remove(app.container_of(id).unwrap()).unwrap();
    assert_eq!(app.state(id), LifecycleState::Removed);
}

#[test]
fn test_root_cannot_be_removed() {
    let (app, _) = app_with(StaticLoader::new());
    assert!(!app.remove(app.root()));
    assert!(app.is_alive(app.root()));
}

#[test]
fn test_unknown_component() {
    let (app, _) = app_with(StaticLoader::new());
    let ghost = InstanceRef(999);
    assert_eq!(app.state(ghost), LifecycleState::Removed);
    assert!(!app.remove(ghost));
    assert!(app.container_of(ghost).is_none());
    assert!(matches!(
        app.block_on(app.reload(ghost)),
        Err(EngineError::UnknownComponent(_))
    ));
}

#[test]
fn test_removed_while_loading() {
    let (open, gate) = smol::channel::bounded(1);
    let loader = GatedLoader {
        gate,
        markup: "<p>late</p>",
    };
    let app = App::new(AppConfig::default(), Rc::new(loader));
    let log = Log::default();
    let mut slow = Probe::new("slow", Some("/slow"), &log);
    slow.detached = true;
    app.register("slow-view", move || slow.clone());
    start(&app, "<slow-view></slow-view>");

    let id = only(&app, "slow-view");
    assert!(matches!(
        app.state(id),
        LifecycleState::Initialized | LifecycleState::ContentLoading
    ));
    assert!(app.remove(id));
    open.try_send(()).unwrap();
    app.run_pending();

    assert_eq!(app.state(id), LifecycleState::Removed);
    assert!(!has(&log, "slow:load"));
    assert!(!has(&log, "slow:show"));
    assert!(app.query("p").is_empty());
}

// ============================================================================
// CONTENT
// ============================================================================

#[test]
fn test_empty_content_keeps_host_children() {
    let (app, _) = app_with(StaticLoader::new().with_page("/empty", ""));
    let log = Log::default();
    let a = Probe::new("a", Some("/empty"), &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a><em>keep</em></tag-a>");

    let a = only(&app, "tag-a");
    let container = app.container_of(a).unwrap();
    assert_eq!(app.markup(container), "<em>keep</em>");
    assert_eq!(app.tree().get_attr(container, "tag-a"), None);
    assert!(has(&log, "a:load"));
    assert_eq!(app.state(a), LifecycleState::Active);
}

#[test]
fn test_without_url_host_children_expand() {
    let (app, _) = app_with(StaticLoader::new().with_page("/b", "<span>B</span>"));
    let log = Log::default();
    let a = Probe::new("a", None, &log);
    let b = Probe::new("b", Some("/b"), &log);
    app.register("tag-a", move || a.clone());
    app.register("tag-b", move || b.clone());
    start(&app, "<tag-a><div><tag-b></tag-b></div></tag-a>");

    let a = only(&app, "tag-a");
    let b = only(&app, "tag-b");
    assert_eq!(app.component(b).unwrap().parent(), Some(a));
    assert_eq!(app.markup(app.container_of(a).unwrap()), "<div><tag-b tag-b><span>B</span></tag-b></div>");
}

#[test]
fn test_transport_failure_markup() {
    let (app, _) = app_with(StaticLoader::new().with_failure("/down", 0, "offline"));
    let log = Log::default();
    let a = Probe::new("a", Some("/down"), &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");

    let a = only(&app, "tag-a");
    assert_eq!(app.state(a), LifecycleState::LoadFailed);
    assert_eq!(
        app.markup(app.container_of(a).unwrap()),
        r#"<sdc-error data-code="0">offline</sdc-error>"#
    );
}

#[test]
fn test_unknown_mixin_is_skipped() {
    let (app, _) = app_with(StaticLoader::new());
    let log = Log::default();
    let a = Probe::new("a", None, &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a_ghost></tag-a_ghost>");

    let a = only(&app, "tag-a");
    assert_eq!(app.component(a).unwrap().mixin_tags().count(), 0);
}

#[test]
fn test_unregistered_tags_are_ignored() {
    let (app, loader) = app_with(StaticLoader::new());
    start(&app, "<tag-a></tag-a><div><other-tag></other-tag></div>");
    assert!(app.iterate_all_children(app.root()).is_empty());
    assert_eq!(loader.call_count(), 0);
}

// ============================================================================
// HOOKS
// ============================================================================

#[test]
fn test_pending_hook_is_awaited() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", "<p>A</p>"));
    let log = Log::default();
    let mut a = Probe::new("a", Some("/a"), &log);
    a.slow_show = true;
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");

    assert!(position(&log, "a:shown") < position(&log, "a:refresh"));
}

#[test]
fn test_refresh_container_targets_owner() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", "<p>A</p>"));
    let log = Log::default();
    let a = Probe::new("a", Some("/a"), &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");

    let p = app.query("p")[0];
    app.block_on(app.refresh_container(p));
    assert_eq!(log.borrow().iter().filter(|e| *e == "a:refresh").count(), 2);
}

// ============================================================================
// RECONCILIATION
// ============================================================================

#[test]
fn test_reconcile_component_with_built_candidate() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", "<p>old</p>"));
    let log = Log::default();
    let a = Probe::new("a", Some("/a"), &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");

    let id = only(&app, "tag-a");
    let candidate = app.update_tree(|tree| {
        let p = tree.create_element("p");
        let text = tree.create_text("new");
        tree.append_child(p, text).unwrap();
        p
    });
    let p = app.query("p")[0];
    let stats = app.block_on(app.reconcile_component(id, candidate, None)).unwrap();

    assert_eq!(app.markup(app.container_of(id).unwrap()), "<p>new</p>");
    assert_eq!(app.query("p")[0], p);
    assert!(!stats.is_noop());
    assert!(!app.update_tree(|tree| tree.is_alive(candidate)));
}

#[test]
fn test_reconcile_identical_is_noop() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", "<p>same</p>"));
    let log = Log::default();
    let a = Probe::new("a", Some("/a"), &log);
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");

    let id = only(&app, "tag-a");
    let stats = app.block_on(app.reconcile_markup(id, "<p>same</p>")).unwrap();
    assert!(stats.is_noop());
}

// ============================================================================
// EVENT PROPAGATION
// ============================================================================

fn nested_handlers(flow: Propagation) -> (App, Log) {
    let loader = StaticLoader::new()
        .with_page("/outer", "<inner-box></inner-box>")
        .with_page("/inner", r#"<button class="btn">Go</button>"#);
    let (app, _) = app_with(loader);
    let log = Log::default();
    let mut outer = Probe::new("outer", Some("/outer"), &log);
    outer.selector = Some(".btn");
    let mut inner = Probe::new("inner", Some("/inner"), &log);
    inner.selector = Some(".btn");
    inner.flow = flow;
    app.register("outer-box", move || outer.clone());
    app.register("inner-box", move || inner.clone());
    start(&app, "<outer-box></outer-box>");
    log.borrow_mut().clear();
    (app, log)
}

#[test]
fn test_event_bubbles_through_components() {
    let (app, log) = nested_handlers(Propagation::Continue);
    let button = app.query("button")[0];
    assert_eq!(app.dispatch_event(button, "click"), 2);
    assert_eq!(*log.borrow(), vec!["inner:inner", "outer:outer"]);
}

#[test]
fn test_stop_immediate_skips_ancestors() {
    let (app, log) = nested_handlers(Propagation::StopImmediate);
    let button = app.query("button")[0];
    assert_eq!(app.dispatch_event(button, "click"), 1);
    assert_eq!(*log.borrow(), vec!["inner:inner"]);
}

#[test]
fn test_stop_immediate_finishes_own_tokens() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", r#"<p sdc_click="first second">x</p>"#));
    let log = Log::default();
    let mut a = Probe::new("a", Some("/a"), &log);
    a.flow = Propagation::StopImmediate;
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");
    log.borrow_mut().clear();

    let p = app.query("p")[0];
    assert_eq!(app.dispatch_event(p, "click"), 2);
    assert_eq!(*log.borrow(), vec!["a:first", "a:second"]);
}

#[test]
fn test_stop_ends_dispatch() {
    let (app, _) = app_with(StaticLoader::new().with_page("/a", r#"<p sdc_click="first second">x</p>"#));
    let log = Log::default();
    let mut a = Probe::new("a", Some("/a"), &log);
    a.flow = Propagation::Stop;
    app.register("tag-a", move || a.clone());
    start(&app, "<tag-a></tag-a>");
    log.borrow_mut().clear();

    let p = app.query("p")[0];
    assert_eq!(app.dispatch_event(p, "click"), 1);
    assert_eq!(*log.borrow(), vec!["a:first"]);
}

#[test]
fn test_removed_handlers_do_not_fire() {
    let (app, log) = nested_handlers(Propagation::Continue);
    let inner = only(&app, "inner-box");
    let button = app.query("button")[0];
    assert!(app.remove(inner));
    assert!(!app.tree().is_alive(button));
    log.borrow_mut().clear();
    assert_eq!(app.dispatch_event(button, "click"), 0);
}

// ============================================================================
// RESET
// ============================================================================

#[test]
fn test_reset_twice() {
    let (app, _) = app_with(StaticLoader::new());
    app.reset();
    app.reset();
    assert!(app.is_alive(app.root()));
    assert_eq!(app.children_of(app.root()), Vec::<ComponentId>::new());
    assert_eq!(app.markup(app.body()), "");
}
