//! Component instances
//!
//! The arena of live component records, their lifecycle state and the
//! remote-model handles they hold.

use std::collections::BTreeMap;
use std::fmt;

use sdc_dom::{InstanceRef, NodeId};

use crate::controller::Controller;
use crate::events::EventTable;

/// Opaque component identity, also stored in the container node's
/// reserved instance slot
pub type ComponentId = InstanceRef;

/// Lifecycle of a component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Initialized,
    ContentLoading,
    ContentLoaded,
    LoadFailed,
    Shown,
    Active,
    Removed,
}

impl LifecycleState {
    /// Still part of the application
    pub fn is_alive(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Removed)
    }

    /// Content has been spliced into the container
    pub fn is_shown(&self) -> bool {
        matches!(self, Self::Shown | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::ContentLoading => "content_loading",
            Self::ContentLoaded => "content_loaded",
            Self::LoadFailed => "load_failed",
            Self::Shown => "shown",
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a remote data model held by a component
pub trait ModelHandle {
    /// Release the connection; called once when the owner is removed
    fn close(&mut self);

    fn name(&self) -> &str {
        "model"
    }
}

/// A capability delegated to alongside the main controller
pub(crate) struct Mixin {
    pub(crate) tag: String,
    pub(crate) controller: Box<dyn Controller>,
}

/// Everything the engine tracks about one instance
pub struct ComponentRecord {
    pub(crate) tag: String,
    pub(crate) container: NodeId,
    pub(crate) parent: Option<ComponentId>,
    /// Child instances grouped by tag name
    pub(crate) children: BTreeMap<String, Vec<ComponentId>>,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) mixins: Vec<Mixin>,
    pub(crate) content_url: Option<String>,
    /// Placeholder names, parsed on first load
    pub(crate) url_params: Option<Vec<String>>,
    pub(crate) hard_reload: bool,
    pub(crate) detached: bool,
    pub(crate) loaded: bool,
    pub(crate) mixin_running: bool,
    pub(crate) events: EventTable,
    pub(crate) models: Vec<Box<dyn ModelHandle>>,
    pub(crate) state: LifecycleState,
}

impl ComponentRecord {
    pub(crate) fn new(
        tag: &str,
        container: NodeId,
        parent: Option<ComponentId>,
        controller: Box<dyn Controller>,
        mixins: Vec<Mixin>,
    ) -> Self {
        let mut events = controller.events();
        for mixin in &mixins {
            events.merge(&mixin.controller.events());
        }
        Self {
            tag: tag.to_string(),
            container,
            parent,
            children: BTreeMap::new(),
            content_url: controller.content_url(),
            url_params: None,
            hard_reload: controller.content_reload(),
            detached: controller.load_async(),
            loaded: false,
            mixin_running: false,
            events,
            models: Vec::new(),
            state: LifecycleState::Created,
            controller,
            mixins,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn content_url(&self) -> Option<&str> {
        self.content_url.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mixin_tags(&self) -> impl Iterator<Item = &str> {
        self.mixins.iter().map(|m| m.tag.as_str())
    }

    /// Children in tag order, then insertion order
    pub fn children(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.children.values().flatten().copied()
    }

    pub fn children_of(&self, tag: &str) -> &[ComponentId] {
        self.children.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn add_child(&mut self, tag: &str, child: ComponentId) {
        let list = self.children.entry(tag.to_string()).or_default();
        if !list.contains(&child) {
            list.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ComponentId) {
        for list in self.children.values_mut() {
            list.retain(|&c| c != child);
        }
        self.children.retain(|_, list| !list.is_empty());
    }
}

impl fmt::Debug for ComponentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRecord")
            .field("tag", &self.tag)
            .field("container", &self.container)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Slot arena of component records; ids are never reused
#[derive(Debug, Default)]
pub struct ComponentArena {
    slots: Vec<Option<ComponentRecord>>,
}

impl ComponentArena {
    pub(crate) fn insert(&mut self, record: ComponentRecord) -> ComponentId {
        let id = InstanceRef(self.slots.len() as u32);
        self.slots.push(Some(record));
        id
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentRecord> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut ComponentRecord> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, id: ComponentId) -> Option<ComponentRecord> {
        self.slots.get_mut(id.0 as usize).and_then(Option::take)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ComponentRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (InstanceRef(i as u32), r)))
    }

    /// Drop every record while keeping the id counter
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
