//! DOM Tree (arena-based allocation)
//!
//! Nodes live in a single `Vec` and link to each other by `NodeId`.
//! Removal frees the slot for reuse and bumps its generation, so an id
//! held across a suspension point can always be checked with `is_alive`.

use crate::{DomError, DomResult, InstanceRef, Node, NodeData, NodeId};
use crate::node::ElementData;

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
    /// Freed slots, reused last-in first-out
    free: Vec<u32>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a tree holding only the document root
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::document()],
            free: Vec::new(),
        }
    }

    /// Root document node
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a live node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.index())
            .filter(|node| !node.removed && node.generation == id.generation())
    }

    /// Get a mutable live node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .filter(|node| !node.removed && node.generation == id.generation())
    }

    /// Number of allocated node slots (live and free)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes that have not been removed
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|node| !node.removed).count()
    }

    /// True while the node exists and has not been removed
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    fn push(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.nodes[index as usize];
            let generation = slot.generation;
            *slot = Node { generation, ..node };
            return NodeId::new(index, generation);
        }
        let id = NodeId::new(self.nodes.len() as u32, 0);
        self.nodes.push(node);
        id
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.get(id).ok_or(DomError::NotFound(id))
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a detached element
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(Node::element(name))
    }

    /// Create a detached element with attributes
    pub fn create_element_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut node = Node::element(name);
        if let Some(elem) = node.as_element_mut() {
            for (attr, value) in attrs {
                elem.set_attr(attr, *value);
            }
        }
        self.push(node)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(Node::text(content))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.push(Node::comment(content))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent.to_option())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.first_child.to_option())
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.last_child.to_option())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.prev_sibling.to_option())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.next_sibling.to_option())
    }

    /// Iterate over the direct children of a node
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.first_child(id),
        }
    }

    /// Snapshot of the direct children, safe to hold while mutating
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).map(|(child, _)| child).collect()
    }

    /// All descendants in pre-order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_ids(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.child_ids(next).into_iter().rev());
        }
        out
    }

    /// Ancestors from the parent upward
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// True if `node` is `ancestor` or lies beneath it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// True if the node is connected to the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_alive(id) && self.contains(NodeId::ROOT, id)
    }

    // ------------------------------------------------------------------
    // Data access
    // ------------------------------------------------------------------

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(Node::as_element_mut)
    }

    /// Lowercase tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|elem| elem.name.as_str())
    }

    pub fn get_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|elem| elem.get_attr(name))
    }

    /// Set an attribute on an element; returns whether the value changed
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<bool> {
        let elem = self.element_mut(id).ok_or(DomError::NotFound(id))?;
        Ok(elem.set_attr(name, value))
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id).and_then(|elem| elem.remove_attr(name))
    }

    /// Replace the payload of a text node
    pub fn set_text(&mut self, id: NodeId, content: &str) -> DomResult<()> {
        match self.get_mut(id).map(|node| &mut node.data) {
            Some(NodeData::Text(text)) => {
                text.content = content.to_string();
                Ok(())
            }
            _ => Err(DomError::NotFound(id)),
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.get(id).and_then(Node::as_text) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(text) = self.get(node).and_then(Node::as_text) {
                out.push_str(text);
            }
        }
        out
    }

    /// Instance mounted on this node, if any
    pub fn instance(&self, id: NodeId) -> Option<InstanceRef> {
        self.get(id).and_then(|node| node.instance)
    }

    /// Replace the instance slot, returning the previous occupant
    pub fn set_instance(&mut self, id: NodeId, instance: Option<InstanceRef>) -> Option<InstanceRef> {
        let node = self.get_mut(id)?;
        std::mem::replace(&mut node.instance, instance)
    }

    /// Nearest node at or above `id` that carries an instance
    pub fn nearest_instance(&self, id: NodeId) -> Option<(NodeId, InstanceRef)> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|node| self.instance(node).map(|inst| (node, inst)))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    fn check_insert(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    fn unlink(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = &self.nodes[id.index()];
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if prev.is_valid() {
            self.nodes[prev.index()].next_sibling = next;
        } else if parent.is_valid() {
            self.nodes[parent.index()].first_child = next;
        }
        if next.is_valid() {
            self.nodes[next.index()].prev_sibling = prev;
        } else if parent.is_valid() {
            self.nodes[parent.index()].last_child = prev;
        }
        let node = &mut self.nodes[id.index()];
        node.parent = NodeId::NONE;
        node.prev_sibling = NodeId::NONE;
        node.next_sibling = NodeId::NONE;
    }

    fn link(&mut self, parent: NodeId, child: NodeId, prev: NodeId, next: NodeId) {
        {
            let node = &mut self.nodes[child.index()];
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
        if prev.is_valid() {
            self.nodes[prev.index()].next_sibling = child;
        } else {
            self.nodes[parent.index()].first_child = child;
        }
        if next.is_valid() {
            self.nodes[next.index()].prev_sibling = child;
        } else {
            self.nodes[parent.index()].last_child = child;
        }
    }

    /// Insert `child` under `parent` before `reference` (or at the end).
    /// The child is detached from its current position first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        self.check_insert(parent, child)?;
        if reference == Some(child) {
            return Ok(());
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild(reference));
            }
        }
        self.unlink(child);
        let (prev, next) = match reference {
            Some(reference) => (self.nodes[reference.index()].prev_sibling, reference),
            None => (self.nodes[parent.index()].last_child, NodeId::NONE),
        };
        self.link(parent, child, prev, next);
        Ok(())
    }

    /// Append a child node
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert a child as the first child of `parent`
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let first = self.first_child(parent);
        self.insert_before(parent, child, first)
    }

    /// Insert `child` directly after `reference`, under the same parent
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> DomResult<()> {
        if reference == child {
            return Ok(());
        }
        let parent = self.parent(reference).ok_or(DomError::NotAChild(reference))?;
        let next = self.next_sibling(reference);
        if next == Some(child) {
            return Ok(());
        }
        self.insert_before(parent, child, next)
    }

    /// Unlink a node from its parent, keeping its subtree intact
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        self.node(id)?;
        self.unlink(id);
        Ok(())
    }

    /// Remove a node and its whole subtree. Removing an already removed
    /// node is a no-op.
    pub fn remove(&mut self, id: NodeId) -> DomResult<()> {
        if id == NodeId::ROOT {
            return Err(DomError::HierarchyRequest {
                parent: NodeId::NONE,
                child: id,
            });
        }
        if self.nodes.get(id.index()).is_none() {
            return Err(DomError::NotFound(id));
        }
        if !self.is_alive(id) {
            return Ok(());
        }
        let doomed = self.descendants(id);
        self.unlink(id);
        for node in std::iter::once(id).chain(doomed) {
            let index = node.index();
            let slot = &mut self.nodes[index];
            slot.removed = true;
            slot.instance = None;
            slot.generation = slot.generation.wrapping_add(1);
            slot.data = NodeData::Comment(String::new());
            self.free.push(index as u32);
        }
        Ok(())
    }

    /// Remove every child of a node, returning the removed ids
    pub fn clear_children(&mut self, id: NodeId) -> DomResult<Vec<NodeId>> {
        self.node(id)?;
        let children = self.child_ids(id);
        for &child in &children {
            self.remove(child)?;
        }
        Ok(children)
    }

    /// Detached copy of a node without its children or instance slot
    pub fn clone_shallow(&mut self, id: NodeId) -> DomResult<NodeId> {
        let data = self.node(id)?.data.clone();
        Ok(self.push(Node::with_data(data)))
    }

    /// Detached copy of a node and its subtree
    pub fn clone_deep(&mut self, id: NodeId) -> DomResult<NodeId> {
        let copy = self.clone_shallow(id)?;
        for child in self.child_ids(id) {
            let child_copy = self.clone_deep(child)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }
}

/// Iterator over the children of a node
pub struct Children<'a> {
    tree: &'a DomTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.tree.get(id)?;
        self.next = node.next_sibling.to_option();
        Some((id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tree: &DomTree, parent: NodeId) -> Vec<String> {
        tree.children(parent)
            .map(|(id, node)| match &node.data {
                NodeData::Text(text) => text.content.clone(),
                _ => tree.tag_name(id).unwrap_or_default().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_append_and_prepend() {
        let mut tree = DomTree::new();
        let ul = tree.create_element("ul");
        tree.append_child(tree.root(), ul).unwrap();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        tree.append_child(ul, a).unwrap();
        tree.prepend_child(ul, b).unwrap();
        assert_eq!(names(&tree, ul), vec!["b", "a"]);
        assert_eq!(tree.first_child(ul), Some(b));
        assert_eq!(tree.last_child(ul), Some(a));
    }

    #[test]
    fn test_insert_after_moves_node() {
        let mut tree = DomTree::new();
        let ul = tree.create_element("ul");
        let ids: Vec<_> = ["a", "b", "c"].iter().map(|n| tree.create_element(n)).collect();
        for &id in &ids {
            tree.append_child(ul, id).unwrap();
        }
        tree.insert_after(ids[2], ids[0]).unwrap();
        assert_eq!(names(&tree, ul), vec!["b", "c", "a"]);
        tree.insert_after(ids[1], ids[0]).unwrap();
        assert_eq!(names(&tree, ul), vec!["b", "a", "c"]);
        assert_eq!(tree.prev_sibling(ids[0]), Some(ids[1]));
    }

    #[test]
    fn test_hierarchy_request() {
        let mut tree = DomTree::new();
        let outer = tree.create_element("div");
        let inner = tree.create_element("span");
        tree.append_child(outer, inner).unwrap();
        let err = tree.append_child(inner, outer).unwrap_err();
        assert!(matches!(err, DomError::HierarchyRequest { .. }));
    }

    #[test]
    fn test_remove_marks_subtree_dead() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let text = tree.create_text("hi");
        tree.append_child(tree.root(), div).unwrap();
        tree.append_child(div, text).unwrap();
        tree.set_instance(div, Some(InstanceRef(7)));

        tree.remove(div).unwrap();
        assert!(!tree.is_alive(div));
        assert!(!tree.is_alive(text));
        assert!(tree.first_child(tree.root()).is_none());
        assert!(tree.remove(div).is_ok());
        assert_eq!(tree.instance(div), None);
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let text = tree.create_text("hi");
        tree.append_child(tree.root(), div).unwrap();
        tree.append_child(div, text).unwrap();
        let slots = tree.len();

        tree.remove(div).unwrap();
        let p = tree.create_element("p");
        let span = tree.create_element("span");
        assert_eq!(tree.len(), slots);
        assert_eq!(tree.live_count(), 3);

        // old ids never resolve to the nodes now in their slots
        assert!(!tree.is_alive(div));
        assert!(!tree.is_alive(text));
        assert!(tree.get_attr(div, "class").is_none());
        assert_eq!(tree.tag_name(p), Some("p"));
        assert_eq!(tree.tag_name(span), Some("span"));
        assert!(tree.remove(div).is_ok());
        assert!(tree.is_alive(p));
    }

    #[test]
    fn test_clone_deep() {
        let mut tree = DomTree::new();
        let div = tree.create_element_with_attrs("div", &[("class", "x")]);
        let text = tree.create_text("hello");
        tree.append_child(div, text).unwrap();
        tree.set_instance(div, Some(InstanceRef(1)));

        let copy = tree.clone_deep(div).unwrap();
        assert_ne!(copy, div);
        assert_eq!(tree.get_attr(copy, "class"), Some("x"));
        assert_eq!(tree.text_content(copy), "hello");
        assert_eq!(tree.instance(copy), None);
        assert_eq!(tree.parent(copy), None);
    }

    #[test]
    fn test_nearest_instance() {
        let mut tree = DomTree::new();
        let host = tree.create_element("host");
        let p = tree.create_element("p");
        tree.append_child(tree.root(), host).unwrap();
        tree.append_child(host, p).unwrap();
        tree.set_instance(host, Some(InstanceRef(3)));
        assert_eq!(tree.nearest_instance(p), Some((host, InstanceRef(3))));
        assert!(tree.is_attached(p));
    }
}
