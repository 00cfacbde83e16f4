//! Refresh process coordination
//!
//! A refresh cycle is represented by one [`RefreshProcess`] shared by every
//! component that joins it. Only the call that created the process runs
//! the notification pass, so each participant is notified exactly once
//! no matter how many nested expansions touched it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use sdc_dom::{DomTree, NodeId};
use smol::future::{BoxedLocal, FutureExt};

use crate::app::{App, AppState};
use crate::component::ComponentId;
use crate::controller::Region;
use crate::lifecycle::PendingHooks;
use crate::params::{coerce, data_map};
use crate::value::Value;

/// Element name prefix of a dynamic content region
pub const REGION_PREFIX: &str = "this.";

/// Participants of one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshProcess {
    visited: HashSet<ComponentId>,
    order: Vec<ComponentId>,
}

/// Shared handle threaded through recursive expansion
pub type ProcessHandle = Rc<RefCell<RefreshProcess>>;

impl RefreshProcess {
    /// Start a cycle triggered by `trigger`
    pub fn new(trigger: ComponentId) -> Self {
        let mut process = Self::default();
        process.join(trigger);
        process
    }

    /// Add a participant; false when it already joined
    pub fn join(&mut self, id: ComponentId) -> bool {
        if !self.visited.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.visited.contains(&id)
    }

    pub fn trigger(&self) -> Option<ComponentId> {
        self.order.first().copied()
    }

    /// Participants in joining order
    pub fn participants(&self) -> &[ComponentId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The trigger's ancestor chain from the root down to the trigger,
    /// followed by every other participant, each once
    pub fn notification_order(&self, parent_of: impl Fn(ComponentId) -> Option<ComponentId>) -> Vec<ComponentId> {
        let Some(trigger) = self.trigger() else {
            return Vec::new();
        };
        let mut order: Vec<ComponentId> = std::iter::successors(Some(trigger), |&id| parent_of(id)).collect();
        order.reverse();
        for &id in &self.order[1..] {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        order
    }
}

/// Join `process` or start a new one. The flag is true for the call that
/// owns the cycle and must notify.
pub fn prepare_refresh_process(process: Option<ProcessHandle>, id: ComponentId) -> (ProcessHandle, bool) {
    match process {
        Some(process) => {
            process.borrow_mut().join(id);
            (process, false)
        }
        None => (Rc::new(RefCell::new(RefreshProcess::new(id))), true),
    }
}

/// Region node plus the markup future its owner produced for it
pub(crate) struct RegionJob {
    pub(crate) node: NodeId,
    pub(crate) markup: BoxedLocal<String>,
}

impl AppState {
    pub(crate) fn register_region(&mut self, node: NodeId, owner: ComponentId) {
        self.regions.insert(node, owner);
    }

    /// Ask the owner to render every region it owns below `container`
    pub(crate) fn render_regions(&mut self, container: NodeId, owner: ComponentId) -> Vec<RegionJob> {
        let mut nodes: Vec<NodeId> = self
            .regions
            .iter()
            .filter(|&(&node, &id)| {
                id == owner && self.tree.is_alive(node) && in_subtree(&self.tree, container, node)
            })
            .map(|(&node, _)| node)
            .collect();
        nodes.sort();

        let mut jobs = Vec::new();
        for node in nodes {
            let Some(elem) = self.tree.element(node) else {
                continue;
            };
            let Some(name) = elem.name.strip_prefix(REGION_PREFIX).map(str::to_string) else {
                continue;
            };
            let data: BTreeMap<String, Value> = data_map(elem)
                .into_iter()
                .map(|(key, raw)| {
                    let value = coerce(&raw);
                    (key, value)
                })
                .collect();

            let mut region: Option<Region> = None;
            self.visit_controllers(owner, true, |controller, cx| {
                region = controller.render_region(&name, &data, cx);
                region.is_none()
            });
            if let Some(region) = region {
                tracing::debug!("Rendering region <this.{}> of {}", name, owner);
                jobs.push(RegionJob {
                    node,
                    markup: region.into_future(),
                });
            }
        }
        jobs
    }

    /// Shallow copy of `region` holding the freshly rendered markup in a
    /// `div`
    pub(crate) fn region_candidate(&mut self, region: NodeId, markup: &str) -> Option<NodeId> {
        let candidate = self.tree.clone_shallow(region).ok()?;
        let wrapper = self.tree.create_element("div");
        self.tree.append_child(candidate, wrapper).ok()?;
        if let Err(err) = sdc_html::parse_into(&mut self.tree, wrapper, markup) {
            tracing::warn!("Discarding unparsable region markup: {}", err);
            let _ = self.tree.remove(candidate);
            return None;
        }
        Some(candidate)
    }

    /// Run the event attach pass for one component
    pub(crate) fn attach_events(&mut self, id: ComponentId) {
        let Some(container) = self.components.get(id).map(|r| r.container) else {
            return;
        };
        let AppState { tree, bus, .. } = self;
        bus.attach(tree, id, container);
    }
}

fn in_subtree(tree: &DomTree, container: NodeId, node: NodeId) -> bool {
    node == container || tree.contains(container, node)
}

impl App {
    /// Refresh a component: expand new nested tags, re-render its regions
    /// and run the notification pass
    pub fn refresh(&self, id: ComponentId) -> BoxedLocal<()> {
        self.refresh_in(None, id, None)
    }

    /// Refresh the component owning `node`, limited to the subtree at `node`
    pub fn refresh_container(&self, node: NodeId) -> BoxedLocal<()> {
        match self.controller_of(node) {
            Some(id) => self.refresh_in(Some(node), id, None),
            None => smol::future::ready(()).boxed_local(),
        }
    }

    /// Join or start a cycle for `id`, then refresh
    pub(crate) fn refresh_in(
        &self,
        container: Option<NodeId>,
        id: ComponentId,
        process: Option<ProcessHandle>,
    ) -> BoxedLocal<()> {
        let (process, originating) = prepare_refresh_process(process, id);
        self.refresh_with(container, id, process, originating)
    }

    pub(crate) fn refresh_with(
        &self,
        container: Option<NodeId>,
        id: ComponentId,
        process: ProcessHandle,
        notify: bool,
    ) -> BoxedLocal<()> {
        let app = self.clone();
        async move {
            let Some(own) = app.container_of(id) else {
                return;
            };
            let container = container.unwrap_or(own);
            tracing::debug!("Refreshing {} at {}", id, container);

            app.expand_container(container, id, Some(process.clone())).await;
            if !app.is_alive(id) {
                return;
            }
            app.reload_regions(container, id, process.clone()).await;
            if notify && app.is_alive(id) {
                app.notify(process).await;
            }
        }
        .boxed_local()
    }

    /// Attach events and call the refresh hook of every participant, in
    /// notification order
    pub(crate) async fn notify(&self, process: ProcessHandle) {
        self.notify_pass(process, true).await;
    }

    /// Notification pass closing a reconcile. The owner and its ancestors
    /// only re-attach events; components created while expanding the
    /// candidate also get their refresh hook.
    pub(crate) async fn notify_reconciled(&self, process: ProcessHandle) {
        self.notify_pass(process, false).await;
    }

    async fn notify_pass(&self, process: ProcessHandle, refresh_chain: bool) {
        let (order, trigger, joined) = {
            let process = process.borrow();
            let order = self.with_state(|s| {
                process.notification_order(|id| s.components.get(id).and_then(|r| r.parent))
            });
            let joined: HashSet<ComponentId> = process.participants().iter().skip(1).copied().collect();
            (order, process.trigger(), joined)
        };
        let Some(trigger) = trigger else {
            return;
        };
        tracing::debug!("Notifying {} components for refresh of {}", order.len(), trigger);

        for id in order {
            if !self.is_alive(id) {
                continue;
            }
            let pending = self.with_state(|s| {
                s.attach_events(id);
                if refresh_chain || joined.contains(&id) {
                    s.call_hooks(id, |controller, cx| controller.on_refresh(trigger, cx))
                } else {
                    PendingHooks::default()
                }
            });
            self.await_hooks(id, pending).await;
        }
    }

    /// Re-render the owner's regions below `container` concurrently and
    /// wait for all of them
    pub(crate) async fn reload_regions(&self, container: NodeId, owner: ComponentId, process: ProcessHandle) {
        let jobs = self.with_state(|s| s.render_regions(container, owner));
        let tasks: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let app = self.clone();
                let process = process.clone();
                self.spawn(async move {
                    let markup = job.markup.await;
                    let candidate = app.with_state(|s| {
                        let alive = s.is_alive(owner) && s.tree.is_alive(job.node);
                        alive.then(|| s.region_candidate(job.node, &markup)).flatten()
                    });
                    if let Some(candidate) = candidate {
                        if let Err(err) = app.reconcile_into(owner, candidate, job.node, Some(process)).await {
                            tracing::warn!("Region update of {} failed: {}", owner, err);
                        }
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_dom::InstanceRef;

    #[test]
    fn test_join_once() {
        let mut process = RefreshProcess::new(InstanceRef(3));
        assert!(process.join(InstanceRef(4)));
        assert!(!process.join(InstanceRef(3)));
        assert_eq!(process.participants(), &[InstanceRef(3), InstanceRef(4)]);
        assert_eq!(process.trigger(), Some(InstanceRef(3)));
    }

    #[test]
    fn test_notification_order() {
        // 0 <- 1 <- 2 (trigger); 5 and 1 joined later
        let parents = |id: ComponentId| match id.0 {
            1 => Some(InstanceRef(0)),
            2 => Some(InstanceRef(1)),
            5 => Some(InstanceRef(0)),
            _ => None,
        };
        let mut process = RefreshProcess::new(InstanceRef(2));
        process.join(InstanceRef(5));
        process.join(InstanceRef(1));

        assert_eq!(
            process.notification_order(parents),
            vec![InstanceRef(0), InstanceRef(1), InstanceRef(2), InstanceRef(5)]
        );
    }

    #[test]
    fn test_prepare_refresh_process() {
        let (process, originating) = prepare_refresh_process(None, InstanceRef(1));
        assert!(originating);
        let (joined, originating) = prepare_refresh_process(Some(process.clone()), InstanceRef(2));
        assert!(!originating);
        assert!(Rc::ptr_eq(&process, &joined));
        assert_eq!(process.borrow().len(), 2);
    }
}
