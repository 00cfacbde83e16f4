//! DOM Node Operations
//!
//! Error type for tree mutation and the detached fragment container.

use crate::NodeId;
use thiserror::Error;

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// Node not found (or already removed)
    #[error("node {0} not found")]
    NotFound(NodeId),
    /// Hierarchy error (e.g., inserting an ancestor into its descendant)
    #[error("hierarchy request error: cannot insert {child} under {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    /// Reference node has no parent to insert next to
    #[error("node {0} is not attached to a parent")]
    NotAChild(NodeId),
}

/// Document fragment - lightweight container of detached top-level nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFragment {
    pub children: Vec<NodeId>,
}

impl DocumentFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, node: NodeId) {
        self.children.push(node);
    }

    pub fn prepend(&mut self, node: NodeId) {
        self.children.insert(0, node);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    /// Take all children (clears fragment)
    pub fn take_children(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.children)
    }
}

impl From<Vec<NodeId>> for DocumentFragment {
    fn from(children: Vec<NodeId>) -> Self {
        Self { children }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_fragment() {
        let mut frag = DocumentFragment::new();
        frag.append(NodeId::new(1, 0));
        frag.prepend(NodeId::new(2, 0));

        assert_eq!(frag.len(), 2);
        assert_eq!(frag.iter().collect::<Vec<_>>(), vec![NodeId::new(2, 0), NodeId::new(1, 0)]);

        let children = frag.take_children();
        assert_eq!(children.len(), 2);
        assert!(frag.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = DomError::NotAChild(NodeId::new(3, 0));
        assert_eq!(err.to_string(), "node #3 is not attached to a parent");
    }
}
