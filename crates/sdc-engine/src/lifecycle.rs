//! Lifecycle orchestration
//!
//! Drives each instance through
//! `Created -> Initialized -> ContentLoading -> ContentLoaded | LoadFailed
//! -> Shown -> Active`, expanding the nested tags found in its content
//! through the same path.
//!
//! Every continuation re-checks that its component is still alive after
//! each suspension point, so work for a component removed mid-flight
//! falls through silently.

use std::collections::BTreeMap;

use sdc_dom::{DocumentFragment, DomResult, NodeId};
use smol::future::{BoxedLocal, FutureExt};
use smol::Task;

use crate::app::{App, AppState};
use crate::component::{ComponentId, ComponentRecord, LifecycleState, Mixin};
use crate::controller::{Controller, Hook, HookCx};
use crate::loader::{LoadFailure, LoadRequest};
use crate::params::{substitute_url, url_placeholders, Params};
use crate::refresh::{prepare_refresh_process, ProcessHandle, REGION_PREFIX};
use crate::registry::Registration;
use crate::value::Value;

/// Raised with the `url-link` target when content has moved
pub const REDIRECT_EVENT: &str = "_RedirectOnView";

/// Raised with the status after every failed load
pub const NAV_LOADED_EVENT: &str = "navLoaded";

/// A registered tag found while scanning a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FoundTag {
    pub(crate) node: NodeId,
    pub(crate) tag: String,
    pub(crate) mixins: Vec<String>,
    /// Instance already mounted on the node
    pub(crate) existing: Option<ComponentId>,
}

/// Request to send, or the cached markup that replaces it
pub(crate) struct PreparedLoad {
    request: LoadRequest,
    cached: Option<String>,
}

/// Futures returned by a hook pass
#[derive(Default)]
pub(crate) struct PendingHooks {
    futures: Vec<BoxedLocal<()>>,
    /// The pass set the mixin-running guard
    guard: bool,
}

impl AppState {
    pub(crate) fn is_alive(&self, id: ComponentId) -> bool {
        self.components.get(id).is_some_and(|r| r.state.is_alive())
    }

    pub(crate) fn set_state(&mut self, id: ComponentId, state: LifecycleState) {
        if let Some(record) = self.components.get_mut(id) {
            tracing::debug!("<{}> {}: {} -> {}", record.tag, id, record.state, state);
            record.state = state;
        }
    }

    /// Call `visit` with the main controller, then with each mixin while
    /// it returns true. Mixins are skipped while the guard is set.
    pub(crate) fn visit_controllers(
        &mut self,
        id: ComponentId,
        with_mixins: bool,
        mut visit: impl FnMut(&mut dyn Controller, &mut HookCx<'_>) -> bool,
    ) -> bool {
        let AppState { tree, components, .. } = self;
        let Some(record) = components.get_mut(id) else {
            return false;
        };
        let ComponentRecord {
            tag,
            container,
            controller,
            mixins,
            models,
            mixin_running,
            ..
        } = record;
        let mut cx = HookCx {
            tree,
            id,
            tag: tag.as_str(),
            container: *container,
            models,
        };
        if !visit(controller.as_mut(), &mut cx) {
            return true;
        }
        if with_mixins && !*mixin_running {
            for mixin in mixins.iter_mut() {
                if !visit(mixin.controller.as_mut(), &mut cx) {
                    break;
                }
            }
        }
        true
    }

    /// Run a hook on the controller and its mixins, collecting the
    /// pending results
    pub(crate) fn call_hooks(
        &mut self,
        id: ComponentId,
        mut hook: impl FnMut(&mut dyn Controller, &mut HookCx<'_>) -> Hook,
    ) -> PendingHooks {
        let runs_mixins = self
            .components
            .get(id)
            .is_some_and(|r| !r.mixin_running && !r.mixins.is_empty());
        let mut futures = Vec::new();
        self.visit_controllers(id, true, |controller, cx| {
            if let Hook::Pending(future) = hook(controller, cx) {
                futures.push(future);
            }
            true
        });
        let guard = runs_mixins && !futures.is_empty();
        if guard {
            if let Some(record) = self.components.get_mut(id) {
                record.mixin_running = true;
            }
        }
        PendingHooks { futures, guard }
    }

    /// Registered tags directly below `container`, not descending into
    /// them. `this.<name>` elements become regions of `parent`.
    pub(crate) fn discover_tags(&mut self, container: NodeId, parent: ComponentId) -> Vec<FoundTag> {
        let mut found = Vec::new();
        self.collect_tags(container, parent, &mut found);
        found
    }

    fn collect_tags(&mut self, node: NodeId, parent: ComponentId, found: &mut Vec<FoundTag>) {
        for child in self.tree.child_ids(node) {
            let Some(name) = self.tree.tag_name(child).map(str::to_string) else {
                continue;
            };
            if let Some((tag, mixins)) = self.registry.match_host_tag(&name) {
                let existing = self.tree.instance(child).filter(|&id| self.is_alive(id));
                found.push(FoundTag {
                    node: child,
                    tag,
                    mixins,
                    existing,
                });
            } else if name.starts_with(REGION_PREFIX) {
                self.register_region(child, parent);
            } else {
                self.collect_tags(child, parent, found);
            }
        }
    }

    /// Build the instance for a host tag and run its init hooks
    pub(crate) fn create_component(&mut self, found: &FoundTag, parent: ComponentId) -> Option<ComponentId> {
        let registration = self.registry.get(&found.tag)?.clone();
        if registration.is_global() {
            let shared = self.singletons.get(&found.tag).copied();
            if let Some(id) = shared.filter(|&id| self.is_alive(id)) {
                self.repoint(id, found.node, parent);
                return Some(id);
            }
        }

        let mixins: Vec<Mixin> = self
            .registry
            .resolve_mixins(&found.tag, &found.mixins)
            .into_iter()
            .filter_map(|tag| {
                let controller = self.registry.get(&tag)?.build();
                Some(Mixin { tag, controller })
            })
            .collect();
        let record = ComponentRecord::new(&found.tag, found.node, Some(parent), registration.build(), mixins);
        let events = record.events.clone();
        let id = self.components.insert(record);
        self.tree.set_instance(found.node, Some(id));
        if let Some(parent) = self.components.get_mut(parent) {
            parent.add_child(&found.tag, id);
        }
        self.bus.register(id, &events);
        if registration.is_global() {
            self.singletons.insert(found.tag.clone(), id);
        }
        tracing::debug!("Created <{}> {} under {}", found.tag, id, parent);

        self.init_component(id, &registration);
        self.set_state(id, LifecycleState::Initialized);
        Some(id)
    }

    /// Move a global instance to a new host node
    fn repoint(&mut self, id: ComponentId, node: NodeId, parent: ComponentId) {
        let Some(record) = self.components.get_mut(id) else {
            return;
        };
        let previous_parent = record.parent.replace(parent);
        let previous_container = std::mem::replace(&mut record.container, node);
        let tag = record.tag.clone();

        if let Some(previous) = previous_parent.and_then(|p| self.components.get_mut(p)) {
            previous.remove_child(id);
        }
        if let Some(parent) = self.components.get_mut(parent) {
            parent.add_child(&tag, id);
        }
        if previous_container != node && self.tree.instance(previous_container) == Some(id) {
            self.tree.set_instance(previous_container, None);
        }
        self.tree.set_instance(node, Some(id));
        tracing::debug!("Reusing global <{}> {} at {}", tag, id, node);
    }

    fn init_component(&mut self, id: ComponentId, registration: &Registration) {
        let Some(record) = self.components.get(id) else {
            return;
        };
        let elem = self.tree.element(record.container).cloned();
        let parent = record.parent.and_then(|p| self.components.get(p));
        let lookup: &dyn Fn(&str) -> Option<Value> =
            &|name: &str| parent.and_then(|parent| parent.controller.property(name));

        let main_names = registration
            .init_params()
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| record.controller.init_params());
        let mut params = vec![Params::resolve(elem.as_ref(), &main_names, Some(lookup))];
        for mixin in &record.mixins {
            let names = self
                .registry
                .get(&mixin.tag)
                .and_then(Registration::init_params)
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| mixin.controller.init_params());
            params.push(Params::resolve(elem.as_ref(), &names, Some(lookup)));
        }

        let mut params = params.into_iter();
        self.visit_controllers(id, true, |controller, cx| {
            if let Some(params) = params.next() {
                controller.on_init(&params, cx);
            }
            true
        });
    }

    /// Resolve the content URL and build the request for it
    pub(crate) fn prepare_load(&mut self, id: ComponentId, version: &str) -> Option<PreparedLoad> {
        let record = self.components.get(id)?;
        let url = record.content_url.clone()?;
        let elem = self.tree.element(record.container).cloned();

        let record = self.components.get_mut(id)?;
        if record.url_params.is_none() {
            let names = url_placeholders(&url);
            if !names.is_empty() {
                record.hard_reload = true;
            }
            record.url_params = Some(names);
        }
        let names = record.url_params.clone().unwrap_or_default();
        let params = Params::resolve(elem.as_ref(), &names, None);
        let url = if names.is_empty() {
            url
        } else {
            substitute_url(&url, &names, params.declared())
        };
        record.content_url = Some(url.clone());

        let mut query: Vec<(String, String)> = params
            .rest()
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect();
        query.push(("VERSION".to_string(), version.to_string()));
        query.push(("_method".to_string(), "content".to_string()));

        let tag = record.tag.clone();
        let force_reload = record.hard_reload;
        let cached = if force_reload { None } else { self.cache.get(&tag) };
        Some(PreparedLoad {
            request: LoadRequest {
                url,
                query,
                cache_key: tag,
                force_reload,
            },
            cached,
        })
    }

    /// Raise the navigation signals for a failed load
    pub(crate) fn report_failure(&mut self, tag: &str, failure: &LoadFailure) {
        tracing::warn!("Content of <{}> failed to load: {}", tag, failure);
        if failure.is_moved() {
            let target = failure.redirect_target().map(Value::from).unwrap_or_default();
            self.bus.trigger(REDIRECT_EVENT, target);
        }
        let payload = BTreeMap::from([
            ("tag".to_string(), Value::from(tag)),
            ("status".to_string(), Value::Int(i64::from(failure.status))),
        ]);
        self.bus.trigger(NAV_LOADED_EVENT, Value::Object(payload));
    }

    /// Fire the load hook unless it already ran for this instance
    fn run_on_load(&mut self, id: ComponentId, fragment: &mut DocumentFragment) -> PendingHooks {
        match self.components.get_mut(id) {
            Some(record) if !record.loaded => record.loaded = true,
            _ => return PendingHooks::default(),
        }
        self.call_hooks(id, |controller, cx| controller.on_load(&mut *fragment, cx))
    }

    /// Splice non-empty content into the container, marking it with the
    /// tag and mixin names
    fn fill(&mut self, id: ComponentId, content: Option<DocumentFragment>) -> Option<NodeId> {
        let record = self.components.get(id)?;
        let container = record.container;
        let Some(fragment) = content.filter(|f| !f.is_empty()) else {
            return Some(container);
        };
        let markers: Vec<String> = std::iter::once(record.tag.clone())
            .chain(record.mixin_tags().map(str::to_string))
            .collect();

        if let Err(err) = self.safe_empty(container) {
            tracing::warn!("Could not empty container of {}: {}", id, err);
        }
        for marker in &markers {
            let _ = self.tree.set_attr(container, marker, "");
        }
        for node in fragment.iter() {
            if let Err(err) = self.tree.append_child(container, node) {
                tracing::warn!("Dropping content node of {}: {}", id, err);
            }
        }
        Some(container)
    }

    /// Tear a component down bottom-up. Returns false when the component
    /// or one of its descendants vetoed.
    pub(crate) fn remove_component(&mut self, id: ComponentId) -> bool {
        if self.root == id {
            tracing::warn!("The root component cannot be removed");
            return false;
        }
        let Some(record) = self.components.get_mut(id) else {
            return false;
        };
        for mut model in record.models.drain(..) {
            model.close();
        }
        let children: Vec<ComponentId> = record.children().collect();
        for child in children {
            if !self.remove_component(child) {
                tracing::warn!("Removal of {} aborted by {}", id, child);
                return false;
            }
        }

        let mut allowed = None;
        self.visit_controllers(id, true, |controller, cx| {
            let accepted = controller.on_remove(cx);
            allowed.get_or_insert(accepted);
            true
        });
        if allowed == Some(false) {
            tracing::warn!("{} vetoed its removal", id);
            return false;
        }

        if let Some(container) = self.finish_removal(id) {
            if let Err(err) = self.safe_remove(container) {
                tracing::warn!("Could not remove container of {}: {}", id, err);
            }
        }
        true
    }

    /// Forced teardown of an instance whose node is going away
    pub(crate) fn retire(&mut self, id: ComponentId) {
        if self.root == id {
            return;
        }
        let Some(record) = self.components.get_mut(id) else {
            return;
        };
        for mut model in record.models.drain(..) {
            model.close();
        }
        let children: Vec<ComponentId> = record.children().collect();
        for child in children {
            self.retire(child);
        }
        self.visit_controllers(id, true, |controller, cx| {
            controller.on_remove(cx);
            true
        });
        self.finish_removal(id);
    }

    /// Drop the record and every reference to it; returns its container
    fn finish_removal(&mut self, id: ComponentId) -> Option<NodeId> {
        self.bus.unregister_all(id);
        let mut record = self.components.remove(id)?;
        record.state = LifecycleState::Removed;
        if let Some(parent) = record.parent.and_then(|p| self.components.get_mut(p)) {
            parent.remove_child(id);
        }
        self.regions.retain(|_, owner| *owner != id);
        self.singletons.retain(|_, shared| *shared != id);
        if self.tree.instance(record.container) == Some(id) {
            self.tree.set_instance(record.container, None);
        }
        tracing::debug!("<{}> {}: removed", record.tag, id);
        Some(record.container)
    }

    /// Remove a node, tearing down every instance rooted in its subtree
    pub(crate) fn safe_remove(&mut self, node: NodeId) -> DomResult<()> {
        let doomed: Vec<ComponentId> = std::iter::once(node)
            .chain(self.tree.descendants(node))
            .filter_map(|n| self.tree.instance(n))
            .collect();
        for id in doomed {
            self.retire(id);
        }
        let AppState { tree, regions, .. } = self;
        regions.retain(|&region, _| region != node && !tree.contains(node, region));
        self.tree.remove(node)
    }

    /// Safely remove every child of `node`
    pub(crate) fn safe_empty(&mut self, node: NodeId) -> DomResult<()> {
        for child in self.tree.child_ids(node) {
            self.safe_remove(child)?;
        }
        Ok(())
    }
}

impl App {
    pub(crate) fn spawn<T: 'static>(&self, future: impl std::future::Future<Output = T> + 'static) -> Task<T> {
        self.inner.executor.spawn(future)
    }

    /// Expand every registered tag below `container` concurrently and
    /// wait for all of them
    pub(crate) fn expand_container(
        &self,
        container: NodeId,
        parent: ComponentId,
        process: Option<ProcessHandle>,
    ) -> BoxedLocal<()> {
        let app = self.clone();
        async move {
            let found = app.with_state(|s| s.discover_tags(container, parent));
            if found.is_empty() {
                return;
            }
            tracing::debug!("Expanding {} tags below {}", found.len(), container);
            let tasks: Vec<Task<()>> = found
                .into_iter()
                .map(|tag| app.spawn(app.expand_tag(tag, parent, process.clone())))
                .collect();
            for task in tasks {
                task.await;
            }
        }
        .boxed_local()
    }

    fn expand_tag(&self, found: FoundTag, parent: ComponentId, process: Option<ProcessHandle>) -> BoxedLocal<()> {
        if let Some(existing) = found.existing {
            return self.expand_container(found.node, existing, process);
        }
        match self.with_state(|s| s.create_component(&found, parent)) {
            Some(id) => self.run_lifecycle(id, process),
            None => smol::future::ready(()).boxed_local(),
        }
    }

    /// Run the lifecycle of a freshly initialized instance. Detached
    /// instances run as their own task and resolve immediately.
    pub(crate) fn run_lifecycle(&self, id: ComponentId, process: Option<ProcessHandle>) -> BoxedLocal<()> {
        let detached = self.with_state(|s| s.components.get(id).is_some_and(|r| r.detached));
        let app = self.clone();
        if detached {
            tracing::debug!("Detaching lifecycle of {}", id);
            self.spawn(async move { app.drive_lifecycle(id, None).await }).detach();
            return smol::future::ready(()).boxed_local();
        }
        async move { app.drive_lifecycle(id, process).await }.boxed_local()
    }

    async fn drive_lifecycle(&self, id: ComponentId, process: Option<ProcessHandle>) {
        if !self.is_alive(id) {
            return;
        }
        let (process, originating) = prepare_refresh_process(process, id);

        self.with_state(|s| s.set_state(id, LifecycleState::ContentLoading));
        let loaded = self.load_content(id).await;
        if !self.is_alive(id) {
            return;
        }
        let content = match loaded {
            Ok(content) => content,
            Err(error) => {
                self.with_state(|s| s.set_state(id, LifecycleState::LoadFailed));
                self.fill_content(id, Some(error), None).await;
                return;
            }
        };

        self.with_state(|s| s.set_state(id, LifecycleState::ContentLoaded));
        let mut fragment = content.unwrap_or_default();
        let pending = self.with_state(|s| s.run_on_load(id, &mut fragment));
        self.await_hooks(id, pending).await;
        if !self.is_alive(id) {
            return;
        }

        self.fill_content(id, Some(fragment), Some(process.clone())).await;
        if !self.is_alive(id) {
            return;
        }
        self.with_state(|s| s.set_state(id, LifecycleState::Shown));
        let pending = self.with_state(|s| s.call_hooks(id, |controller, cx| controller.will_show(cx)));
        self.await_hooks(id, pending).await;
        if !self.is_alive(id) {
            return;
        }

        self.with_state(|s| s.set_state(id, LifecycleState::Active));
        self.refresh_with(None, id, process, originating).await;
    }

    /// Fetch (or reuse) the content of a component. `Ok(None)` means there
    /// is nothing to load; `Err` carries the rendered error fragment.
    pub(crate) async fn load_content(&self, id: ComponentId) -> Result<Option<DocumentFragment>, DocumentFragment> {
        let version = self.inner.config.version.clone();
        let Some(PreparedLoad { request, cached }) = self.with_state(|s| s.prepare_load(id, &version)) else {
            return Ok(None);
        };
        let tag = request.cache_key.clone();
        let force_reload = request.force_reload;
        let from_cache = cached.is_some();
        let result = match cached {
            Some(markup) => {
                tracing::debug!("Serving <{}> from the content cache", tag);
                Ok(markup)
            }
            None => self.inner.loader.load(request).await,
        };

        self.with_state(|s| match result {
            Ok(markup) => {
                if !force_reload && !from_cache {
                    s.cache.put(&tag, markup.clone());
                }
                match sdc_html::parse_fragment(&mut s.tree, &markup) {
                    Ok(fragment) => Ok(Some(fragment)),
                    Err(err) => {
                        tracing::warn!("Content of <{}> could not be parsed: {}", tag, err);
                        Ok(None)
                    }
                }
            }
            Err(failure) => {
                s.report_failure(&tag, &failure);
                let fragment = sdc_html::parse_fragment(&mut s.tree, &failure.to_markup());
                Err(fragment.unwrap_or_default())
            }
        })
    }

    async fn fill_content(&self, id: ComponentId, content: Option<DocumentFragment>, process: Option<ProcessHandle>) {
        if let Some(container) = self.with_state(|s| s.fill(id, content)) {
            self.expand_container(container, id, process).await;
        }
    }

    /// Wait for pending hook results, then release the mixin guard
    pub(crate) async fn await_hooks(&self, id: ComponentId, pending: PendingHooks) {
        let PendingHooks { futures, guard } = pending;
        for future in futures {
            future.await;
        }
        if guard {
            self.with_state(|s| {
                if let Some(record) = s.components.get_mut(id) {
                    record.mixin_running = false;
                }
            });
        }
    }
}
