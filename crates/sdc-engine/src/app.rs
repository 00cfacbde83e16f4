//! Application context
//!
//! [`App`] owns everything a running application shares: the live tree,
//! the component arena, the tag registry, the content cache, the event
//! bus and the local executor that drives every lifecycle.
//!
//! State is only borrowed inside short synchronous sections; no borrow is
//! ever held across an await.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use sdc_dom::{DomError, DomTree, HtmlSerializer, NodeId, PatchStats, ReconcileHost, Selector};
use smol::future::{BoxedLocal, FutureExt};
use smol::LocalExecutor;

use crate::cache::{CacheStats, ContentCache};
use crate::component::{ComponentArena, ComponentId, ComponentRecord, LifecycleState};
use crate::config::AppConfig;
use crate::controller::{Controller, Propagation, RootController};
use crate::error::{EngineError, EngineResult};
use crate::events::{event_attr, split_tokens, DelegatedEvents, EventBus, EVENT_TOKEN_PREFIX};
use crate::loader::ContentLoader;
use crate::refresh::{prepare_refresh_process, ProcessHandle, REGION_PREFIX};
use crate::registry::{tag_for_type, Registration, TagRegistry};

/// Shared mutable state of an application
pub struct AppState {
    pub(crate) tree: DomTree,
    pub(crate) body: NodeId,
    pub(crate) components: ComponentArena,
    pub(crate) registry: TagRegistry,
    pub(crate) cache: ContentCache,
    pub(crate) bus: Box<dyn EventBus>,
    /// `this.<name>` region nodes and the component that renders them
    pub(crate) regions: HashMap<NodeId, ComponentId>,
    /// Instances of tags registered as global
    pub(crate) singletons: HashMap<String, ComponentId>,
    pub(crate) root: ComponentId,
}

/// Fresh tree with a body element owned by the root component
fn mount_root(components: &mut ComponentArena, root_tag: &str) -> (DomTree, NodeId, ComponentId) {
    let mut tree = DomTree::new();
    let body = tree.create_element(root_tag);
    // both nodes are fresh
    let _ = tree.append_child(NodeId::ROOT, body);
    let mut record = ComponentRecord::new(root_tag, body, None, Box::new(RootController), Vec::new());
    record.state = LifecycleState::Active;
    let root = components.insert(record);
    tree.set_instance(body, Some(root));
    (tree, body, root)
}

impl AppState {
    fn new(root_tag: &str, bus: Box<dyn EventBus>) -> Self {
        let mut components = ComponentArena::default();
        let (tree, body, root) = mount_root(&mut components, root_tag);
        Self {
            tree,
            body,
            components,
            registry: TagRegistry::new(),
            cache: ContentCache::new(),
            bus,
            regions: HashMap::new(),
            singletons: HashMap::new(),
            root,
        }
    }

    fn reset(&mut self, root_tag: &str) {
        let ids: Vec<ComponentId> = self.components.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(record) = self.components.get_mut(id) {
                for mut model in record.models.drain(..) {
                    model.close();
                }
            }
        }
        self.components.clear();
        self.registry.clear();
        self.cache.clear();
        self.regions.clear();
        self.singletons.clear();
        self.bus.reset();
        let (tree, body, root) = mount_root(&mut self.components, root_tag);
        self.tree = tree;
        self.body = body;
        self.root = root;
    }

    pub(crate) fn container_of(&self, id: ComponentId) -> Option<NodeId> {
        self.components.get(id).map(|r| r.container)
    }

    /// Closest live instance mounted on `node` or one of its ancestors
    pub(crate) fn controller_of(&self, node: NodeId) -> Option<ComponentId> {
        std::iter::once(node)
            .chain(self.tree.ancestors(node))
            .find_map(|n| self.tree.instance(n).filter(|&id| self.is_alive(id)))
    }

    /// Recompute parent links, children maps and region owners for the
    /// instances mounted below `owner`'s container
    pub(crate) fn rebuild_children(&mut self, owner: ComponentId) {
        let Some(container) = self.container_of(owner) else {
            return;
        };
        let nodes = self.tree.descendants(container);
        let mounted: Vec<(NodeId, ComponentId)> = nodes
            .iter()
            .filter_map(|&node| {
                self.tree
                    .instance(node)
                    .filter(|&id| id != owner && self.is_alive(id))
                    .map(|id| (node, id))
            })
            .collect();

        for id in std::iter::once(owner).chain(mounted.iter().map(|&(_, id)| id)) {
            if let Some(record) = self.components.get_mut(id) {
                record.children.clear();
            }
        }
        for &(node, id) in &mounted {
            let parent = self
                .tree
                .parent(node)
                .and_then(|p| self.controller_of(p))
                .unwrap_or(owner);
            let Some(record) = self.components.get_mut(id) else {
                continue;
            };
            record.parent = Some(parent);
            let tag = record.tag.clone();
            if let Some(parent) = self.components.get_mut(parent) {
                parent.add_child(&tag, id);
            }
        }
        for node in nodes {
            let is_region = self
                .tree
                .tag_name(node)
                .is_some_and(|name| name.starts_with(REGION_PREFIX));
            if is_region {
                let region_owner = self.tree.parent(node).and_then(|p| self.controller_of(p)).unwrap_or(owner);
                self.regions.insert(node, region_owner);
            }
        }
    }

    /// Shallow copy of the container holding `children`
    fn wrap_in_container(&mut self, id: ComponentId, children: &[NodeId]) -> EngineResult<NodeId> {
        let container = self.container_of(id).ok_or(EngineError::UnknownComponent(id))?;
        let candidate = self.tree.clone_shallow(container)?;
        for &child in children {
            self.tree.append_child(candidate, child)?;
        }
        Ok(candidate)
    }

    /// Walk from `target` to the document root and run the handlers named
    /// in each `sdc_<event>` attribute, climbing the component chain of
    /// every marked node. Returns the number of handler calls.
    pub(crate) fn dispatch(&mut self, target: NodeId, event: &str) -> usize {
        let attr = event_attr(event);
        let mut calls = 0;
        let mut current = Some(target);
        while let Some(node) = current {
            current = self.tree.parent(node);
            let Some(tokens) = self.tree.get_attr(node, &attr).map(split_tokens) else {
                continue;
            };
            let mut component = self.controller_of(node);
            while let Some(id) = component {
                let mut last_component = false;
                for token in &tokens {
                    let handler = match token.strip_prefix(EVENT_TOKEN_PREFIX) {
                        Some(selector) => match self.bus.handler(id, event, selector) {
                            Some(handler) => handler,
                            None => continue,
                        },
                        None => token.clone(),
                    };
                    calls += 1;
                    let mut flow = Propagation::Continue;
                    self.visit_controllers(id, true, |controller, cx| {
                        flow = controller.on_event(&handler, node, cx);
                        flow == Propagation::Continue
                    });
                    match flow {
                        Propagation::Stop => return calls,
                        Propagation::StopImmediate => last_component = true,
                        Propagation::Continue => {}
                    }
                }
                if last_component {
                    return calls;
                }
                component = self.components.get(id).and_then(|r| r.parent);
            }
        }
        calls
    }
}

impl ReconcileHost for AppState {
    fn tree(&self) -> &DomTree {
        &self.tree
    }

    fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), DomError> {
        self.safe_remove(node)
    }

    fn transfer_instance(&mut self, from: NodeId, to: NodeId) {
        let Some(instance) = self.tree.set_instance(from, None) else {
            return;
        };
        let previous = self.tree.set_instance(to, Some(instance));
        if let Some(previous) = previous.filter(|&p| p != instance) {
            tracing::debug!("{} replaces {} at {}", instance, previous, to);
            self.retire(previous);
        }
        if let Some(record) = self.components.get_mut(instance) {
            record.container = to;
        }
    }
}

pub(crate) struct AppInner {
    pub(crate) state: RefCell<AppState>,
    pub(crate) executor: LocalExecutor<'static>,
    pub(crate) loader: Rc<dyn ContentLoader>,
    pub(crate) config: AppConfig,
}

/// Handle to one application; clones share the same context
#[derive(Clone)]
pub struct App {
    pub(crate) inner: Rc<AppInner>,
}

/// Returned by [`App::register`] to configure the registration further
pub struct RegistrationBuilder<'a> {
    app: &'a App,
    tag: String,
}

impl RegistrationBuilder<'_> {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Delegate to the controller registered under `mixin` as well
    pub fn add_mixin(self, mixin: &str) -> Self {
        let mixin = mixin.to_ascii_lowercase();
        self.update(|registration| registration.mixins.push(mixin))
    }

    /// Bind init parameters to these names instead of the controller's
    pub fn init_params(self, names: &[&str]) -> Self {
        let names = names.iter().map(|name| name.to_string()).collect();
        self.update(|registration| registration.init_params = Some(names))
    }

    /// Share one instance between every occurrence of the tag
    pub fn global(self) -> Self {
        self.update(|registration| registration.global = true)
    }

    fn update(self, apply: impl FnOnce(&mut Registration)) -> Self {
        self.app.with_state(|s| {
            if let Some(registration) = s.registry.get_mut(&self.tag) {
                apply(registration);
            }
        });
        self
    }
}

impl App {
    pub fn new(config: AppConfig, loader: Rc<dyn ContentLoader>) -> Self {
        Self::with_bus(config, loader, Box::new(DelegatedEvents::new()))
    }

    pub fn with_bus(config: AppConfig, loader: Rc<dyn ContentLoader>, bus: Box<dyn EventBus>) -> Self {
        let state = AppState::new(&config.root_tag, bus);
        Self {
            inner: Rc::new(AppInner {
                state: RefCell::new(state),
                executor: LocalExecutor::new(),
                loader,
                config,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.inner.state.borrow_mut())
    }

    /// Register a controller factory for `tag`
    pub fn register<C, F>(&self, tag: &str, factory: F) -> RegistrationBuilder<'_>
    where
        C: Controller,
        F: Fn() -> C + 'static,
    {
        let tag = tag.to_ascii_lowercase();
        self.with_state(|s| {
            s.registry
                .register(&tag, Rc::new(move || Box::new(factory()) as Box<dyn Controller>));
        });
        RegistrationBuilder { app: self, tag }
    }

    /// Register `C` under the tag derived from its type name
    pub fn register_default<C: Controller + Default>(&self) -> RegistrationBuilder<'_> {
        let tag = tag_for_type(std::any::type_name::<C>());
        self.register(&tag, C::default)
    }

    /// Expand every registered tag in the body
    pub fn init(&self) -> BoxedLocal<()> {
        let (body, root) = self.with_state(|s| (s.body, s.root));
        tracing::debug!("Initializing application at {}", body);
        self.expand_container(body, root, None)
    }

    /// Drive `future` and every task the application spawns to completion
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.inner.executor.run(future))
    }

    /// Run spawned tasks until none can make progress
    pub fn run_pending(&self) {
        while self.inner.executor.try_tick() {}
    }

    pub fn root(&self) -> ComponentId {
        self.with_state(|s| s.root)
    }

    pub fn body(&self) -> NodeId {
        self.with_state(|s| s.body)
    }

    /// Read access to the live tree. Do not hold it across an await.
    pub fn tree(&self) -> Ref<'_, DomTree> {
        Ref::map(self.inner.state.borrow(), |s| &s.tree)
    }

    pub fn update_tree<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        self.with_state(|s| f(&mut s.tree))
    }

    pub fn component(&self, id: ComponentId) -> Option<Ref<'_, ComponentRecord>> {
        Ref::filter_map(self.inner.state.borrow(), |s| s.components.get(id)).ok()
    }

    /// Removed for ids that are no longer (or never were) live
    pub fn state(&self, id: ComponentId) -> LifecycleState {
        self.with_state(|s| s.components.get(id).map(|r| r.state))
            .unwrap_or(LifecycleState::Removed)
    }

    pub fn is_alive(&self, id: ComponentId) -> bool {
        self.with_state(|s| s.is_alive(id))
    }

    pub fn container_of(&self, id: ComponentId) -> Option<NodeId> {
        self.with_state(|s| s.container_of(id))
    }

    /// Component whose container is `node` or its closest ancestor
    pub fn controller_of(&self, node: NodeId) -> Option<ComponentId> {
        self.with_state(|s| s.controller_of(node))
    }

    /// Live instances of `tag`, oldest first
    pub fn components_of(&self, tag: &str) -> Vec<ComponentId> {
        self.with_state(|s| {
            s.components
                .iter()
                .filter(|(_, record)| record.tag == tag && record.state.is_alive())
                .map(|(id, _)| id)
                .collect()
        })
    }

    pub fn children_of(&self, id: ComponentId) -> Vec<ComponentId> {
        self.with_state(|s| s.components.get(id).map(|r| r.children().collect()).unwrap_or_default())
    }

    /// Every descendant instance, depth first
    pub fn iterate_all_children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.with_state(|s| {
            let children_of = |id: ComponentId| -> Vec<ComponentId> {
                s.components.get(id).map(|r| r.children().collect()).unwrap_or_default()
            };
            let mut all = Vec::new();
            let mut stack: Vec<ComponentId> = children_of(id).into_iter().rev().collect();
            while let Some(next) = stack.pop() {
                all.push(next);
                stack.extend(children_of(next).into_iter().rev());
            }
            all
        })
    }

    /// Elements anywhere in the document matching `selector`
    pub fn query(&self, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        self.with_state(|s| selector.query_all(&s.tree, NodeId::ROOT))
    }

    /// Parse markup into the body
    pub fn append_markup(&self, markup: &str) -> EngineResult<Vec<NodeId>> {
        self.with_state(|s| -> EngineResult<Vec<NodeId>> {
            let body = s.body;
            Ok(sdc_html::parse_into(&mut s.tree, body, markup)?)
        })
    }

    pub fn markup(&self, node: NodeId) -> String {
        HtmlSerializer::new().serialize_inner(&self.tree(), node)
    }

    pub fn outer_markup(&self, node: NodeId) -> String {
        HtmlSerializer::new().serialize_outer(&self.tree(), node)
    }

    /// Remove a component and its subtree. False when a controller in
    /// the subtree vetoed.
    pub fn remove(&self, id: ComponentId) -> bool {
        self.with_state(|s| s.remove_component(id))
    }

    /// Remove a node, tearing down the components rooted in it
    pub fn safe_remove(&self, node: NodeId) -> EngineResult<()> {
        Ok(self.with_state(|s| s.safe_remove(node))?)
    }

    pub fn safe_empty(&self, node: NodeId) -> EngineResult<()> {
        Ok(self.with_state(|s| s.safe_empty(node))?)
    }

    /// Put `replacement` where `node` is, then safely remove `node`
    pub fn safe_replace(&self, node: NodeId, replacement: NodeId) -> EngineResult<()> {
        self.with_state(|s| -> EngineResult<()> {
            let parent = s.tree.parent(node).ok_or(DomError::NotAChild(node))?;
            s.tree.insert_before(parent, replacement, Some(node))?;
            Ok(s.safe_remove(node)?)
        })
    }

    /// Fetch the content again and reconcile it into the container. The
    /// load hook does not run again.
    pub async fn reload(&self, id: ComponentId) -> EngineResult<PatchStats> {
        if !self.is_alive(id) {
            return Err(EngineError::UnknownComponent(id));
        }
        let fragment = match self.load_content(id).await {
            Ok(Some(fragment)) => fragment,
            Ok(None) => return Ok(PatchStats::default()),
            Err(error) => error,
        };
        let (candidate, live) = self.with_state(|s| -> EngineResult<(NodeId, NodeId)> {
            let live = s.container_of(id).ok_or(EngineError::UnknownComponent(id))?;
            Ok((s.wrap_in_container(id, &fragment.children)?, live))
        })?;
        self.reconcile_into(id, candidate, live, None).await
    }

    /// Expand the tags of `candidate` silently, then reconcile it into
    /// `live` (the component's container when `None`, with the candidate
    /// wrapped in a copy of the container)
    pub async fn reconcile_component(
        &self,
        id: ComponentId,
        candidate: NodeId,
        live: Option<NodeId>,
    ) -> EngineResult<PatchStats> {
        let (candidate, live) = self.with_state(|s| -> EngineResult<(NodeId, NodeId)> {
            match live {
                Some(live) => Ok((candidate, live)),
                None => {
                    let live = s.container_of(id).ok_or(EngineError::UnknownComponent(id))?;
                    Ok((s.wrap_in_container(id, &[candidate])?, live))
                }
            }
        })?;
        self.reconcile_into(id, candidate, live, None).await
    }

    /// Parse `markup` and reconcile it into the component's container
    pub async fn reconcile_markup(&self, id: ComponentId, markup: &str) -> EngineResult<PatchStats> {
        let (candidate, live) = self.with_state(|s| -> EngineResult<(NodeId, NodeId)> {
            let fragment = sdc_html::parse_fragment(&mut s.tree, markup)?;
            let live = s.container_of(id).ok_or(EngineError::UnknownComponent(id))?;
            Ok((s.wrap_in_container(id, &fragment.children)?, live))
        })?;
        self.reconcile_into(id, candidate, live, None).await
    }

    pub(crate) fn reconcile_into(
        &self,
        owner: ComponentId,
        candidate: NodeId,
        live: NodeId,
        process: Option<ProcessHandle>,
    ) -> BoxedLocal<EngineResult<PatchStats>> {
        let app = self.clone();
        async move {
            let (process, originating) = prepare_refresh_process(process, owner);
            app.refresh_with(Some(candidate), owner, process.clone(), false).await;
            let stats = app.with_state(|s| -> EngineResult<PatchStats> {
                if !s.is_alive(owner) || !s.tree.is_alive(live) {
                    let _ = s.safe_remove(candidate);
                    return Ok(PatchStats::default());
                }
                match sdc_dom::reconcile(&mut *s, live, candidate) {
                    Ok(stats) => {
                        s.rebuild_children(owner);
                        tracing::trace!("Reconciled {} into {}: {:?}", owner, live, stats);
                        Ok(stats)
                    }
                    Err(err) => {
                        let _ = s.safe_remove(candidate);
                        Err(err.into())
                    }
                }
            });
            if stats.is_ok() && originating && app.is_alive(owner) {
                app.notify_reconciled(process).await;
            }
            stats
        }
        .boxed_local()
    }

    /// Add a delegated handler at runtime
    pub fn add_event(&self, id: ComponentId, event: &str, selector: &str, handler: &str) {
        self.with_state(|s| {
            let Some(record) = s.components.get_mut(id) else {
                return;
            };
            record.events.add(event, selector, handler);
            let table = record.events.clone();
            s.bus.register(id, &table);
        });
    }

    /// Deliver a DOM-style event at `target`; returns the number of
    /// handler calls
    pub fn dispatch_event(&self, target: NodeId, event: &str) -> usize {
        self.with_state(|s| s.dispatch(target, event))
    }

    /// Drop all cached content
    pub fn clean_cache(&self) {
        self.with_state(|s| s.cache.clear());
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.with_state(|s| s.cache.stats())
    }

    /// Restore a pristine context: empty body, no registrations, no
    /// cached content. Component ids keep counting up.
    pub fn reset(&self) {
        let root_tag = self.inner.config.root_tag.clone();
        self.with_state(|s| s.reset(&root_tag));
    }
}
