//! sdc DOM - Document Object Model
//!
//! Arena-based DOM tree plus the flatten/diff/patch reconciler that
//! updates a live subtree from a freshly rendered candidate.

mod index;
mod node;
mod operations;
mod reconcile;
mod selector;
mod serializer;
mod tree;

pub use index::{flatten, identity_key, NodeRecord, Operation, PATH_SEPARATOR};
pub use node::{Attribute, ElementData, Node, NodeData, TextData};
pub use operations::{DocumentFragment, DomError, DomResult};
pub use reconcile::{
    apply, diff, reconcile, Patch, PatchStats, ReconcileError, ReconcileHost, Side, Step,
};
pub use selector::Selector;
pub use serializer::HtmlSerializer;
pub use tree::DomTree;

/// Node identifier: an arena slot plus the generation the slot had when
/// the node was created. Slots are reused after removal, so an id held
/// across a removal stops resolving instead of aliasing a new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Root document node ID
    pub const ROOT: NodeId = NodeId::new(0, 0);

    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId::new(u32::MAX, 0);

    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Convert the sentinel into `None`
    #[inline]
    pub fn to_option(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}@{}", self.index, generation),
        }
    }
}

/// Opaque back-reference from a node to the component instance mounted on it.
///
/// The DOM never interprets the value; the engine allocates and resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceRef(pub u32);

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}
