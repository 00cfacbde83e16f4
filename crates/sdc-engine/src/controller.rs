//! Component controllers
//!
//! A controller supplies the behaviour of one registered tag. Every hook
//! has a default so implementors only override what they use.

use std::collections::BTreeMap;
use std::future::Future;

use sdc_dom::{DocumentFragment, DomTree, NodeId, Selector};
use sdc_html::ParseResult;
use smol::future::{BoxedLocal, FutureExt};

use crate::component::{ComponentId, ModelHandle};
use crate::events::EventTable;
use crate::params::Params;
use crate::value::Value;

/// Outcome of a lifecycle hook
pub enum Hook {
    Done,
    /// The orchestrator waits for the future before moving on
    Pending(BoxedLocal<()>),
}

impl Hook {
    pub fn pending(future: impl Future<Output = ()> + 'static) -> Self {
        Self::Pending(future.boxed_local())
    }
}

/// Markup produced for a dynamic content region
pub enum Region {
    Ready(String),
    Pending(BoxedLocal<String>),
}

impl Region {
    pub fn pending(future: impl Future<Output = String> + 'static) -> Self {
        Self::Pending(future.boxed_local())
    }

    pub(crate) fn into_future(self) -> BoxedLocal<String> {
        match self {
            Self::Ready(markup) => smol::future::ready(markup).boxed_local(),
            Self::Pending(future) => future,
        }
    }
}

/// Result of a delegated event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Continue,
    /// Finish this component's handlers, skip ancestors
    StopImmediate,
    /// Stop right away
    Stop,
}

/// What a hook may touch while it runs
pub struct HookCx<'a> {
    pub(crate) tree: &'a mut DomTree,
    pub(crate) id: ComponentId,
    pub(crate) tag: &'a str,
    pub(crate) container: NodeId,
    pub(crate) models: &'a mut Vec<Box<dyn ModelHandle>>,
}

impl HookCx<'_> {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn tag(&self) -> &str {
        self.tag
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn tree(&self) -> &DomTree {
        &*self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut *self.tree
    }

    /// Parse markup and append it to `parent`
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> ParseResult<Vec<NodeId>> {
        sdc_html::parse_into(&mut *self.tree, parent, markup)
    }

    /// Elements below the container matching `selector`
    pub fn find(&self, selector: &str) -> Vec<NodeId> {
        Selector::parse(selector)
            .map(|sel| sel.query_all(&*self.tree, self.container))
            .unwrap_or_default()
    }

    /// Keep a model handle alive until this component is removed
    pub fn hold_model(&mut self, model: Box<dyn ModelHandle>) {
        self.models.push(model);
    }
}

/// Behaviour of a registered tag
#[allow(unused_variables)]
pub trait Controller: 'static {
    /// Content to load into the container; may contain `%(name)s`
    /// placeholders filled from the host tag's data attributes
    fn content_url(&self) -> Option<String> {
        None
    }

    /// Never serve this component's content from the cache
    fn content_reload(&self) -> bool {
        false
    }

    /// Run the lifecycle as a detached task
    fn load_async(&self) -> bool {
        false
    }

    /// Names bound positionally from the host tag's data attributes
    fn init_params(&self) -> Vec<String> {
        Vec::new()
    }

    fn events(&self) -> EventTable {
        EventTable::default()
    }

    /// Property readable by child components while resolving parameters
    fn property(&self, name: &str) -> Option<Value> {
        None
    }

    fn on_init(&mut self, params: &Params, cx: &mut HookCx<'_>) {}

    /// Runs once per instance, before the content is spliced in
    fn on_load(&mut self, content: &mut DocumentFragment, cx: &mut HookCx<'_>) -> Hook {
        Hook::Done
    }

    fn will_show(&mut self, cx: &mut HookCx<'_>) -> Hook {
        Hook::Done
    }

    /// `origin` is the component whose refresh started the cycle
    fn on_refresh(&mut self, origin: ComponentId, cx: &mut HookCx<'_>) -> Hook {
        Hook::Done
    }

    /// Return `false` to veto removal
    fn on_remove(&mut self, cx: &mut HookCx<'_>) -> bool {
        true
    }

    /// Markup for a `this.<name>` region; `None` leaves the region alone
    fn render_region(
        &mut self,
        name: &str,
        data: &BTreeMap<String, Value>,
        cx: &mut HookCx<'_>,
    ) -> Option<Region> {
        None
    }

    fn on_event(&mut self, handler: &str, target: NodeId, cx: &mut HookCx<'_>) -> Propagation {
        Propagation::Continue
    }
}

/// Controller of the body container
#[derive(Debug, Default)]
pub struct RootController;

impl Controller for RootController {}
