//! Tree indexing
//!
//! Flattens a subtree into pre-order records carrying the identity key,
//! the root-to-node key path and the depth of every node.

use crate::{DomError, DomResult, DomTree, NodeData, NodeId};

/// Separator between keys inside a path identifier
pub const PATH_SEPARATOR: &str = "::";

const KEY_JOIN: &str = "__";
const TEXT_PREFIX: &str = "TEXT";
const COMMENT_PREFIX: &str = "COMMENT";

/// Per-node annotation chosen by the diff pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Matched; `counterpart` is the record index in the other sequence
    Keep { counterpart: usize },
    /// Live node with no match; `position` orders it among the steps
    Delete { position: usize },
    /// Candidate node adopted into the live tree
    Insert { target: NodeId, after: Option<NodeId> },
    /// Candidate node carried along by an inserted ancestor
    InsertIgnore,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep { .. } => "keep",
            Self::Delete { .. } => "delete",
            Self::Insert { .. } => "insert",
            Self::InsertIgnore => "insert_ignore",
        }
    }

    pub fn counterpart(&self) -> Option<usize> {
        match self {
            Self::Keep { counterpart } => Some(*counterpart),
            _ => None,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. } | Self::InsertIgnore)
    }
}

/// One flattened node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node: NodeId,
    pub key: String,
    /// Keys from the subtree root down to this node, joined by `::`
    pub path: String,
    /// 1 for the subtree root
    pub depth: usize,
    /// Pre-order position
    pub index: usize,
    /// Record index of the parent; `None` for the subtree root
    pub parent: Option<usize>,
    pub op: Option<Operation>,
}

/// Identity key of a node.
///
/// Text and comments include their payload so that a changed payload is a
/// different node. Inputs include `name`, `type` (default `text`) and `id`
/// so that distinct form fields never keep each other's state.
pub fn identity_key(tree: &DomTree, id: NodeId) -> Option<String> {
    let node = tree.get(id)?;
    let key = match &node.data {
        NodeData::Document => "#DOCUMENT".to_string(),
        NodeData::Text(text) => format!("{TEXT_PREFIX}{KEY_JOIN}{}", text.content),
        NodeData::Comment(text) => format!("{COMMENT_PREFIX}{KEY_JOIN}{text}"),
        NodeData::Element(elem) => {
            let mut key = elem.name.clone();
            if elem.is_input() {
                let name = elem.get_attr("name").unwrap_or("");
                let kind = elem.get_attr("type").unwrap_or("text");
                let field_id = elem.get_attr("id").unwrap_or("");
                for part in [name, kind, field_id] {
                    if !part.is_empty() {
                        key.push_str(KEY_JOIN);
                        key.push_str(part);
                    }
                }
            }
            key
        }
    };
    Some(key)
}

/// Flatten the subtree rooted at `root` into pre-order records
pub fn flatten(tree: &DomTree, root: NodeId) -> DomResult<Vec<NodeRecord>> {
    let mut records = Vec::new();
    // (node, parent record index)
    let mut stack = vec![(root, None::<usize>)];
    while let Some((node, parent)) = stack.pop() {
        let key = identity_key(tree, node).ok_or(DomError::NotFound(node))?;
        let (path, depth) = match parent {
            Some(p) => {
                let parent: &NodeRecord = &records[p];
                (
                    format!("{}{PATH_SEPARATOR}{key}", parent.path),
                    parent.depth + 1,
                )
            }
            None => (key.clone(), 1),
        };
        let index = records.len();
        records.push(NodeRecord {
            node,
            key,
            path,
            depth,
            index,
            parent,
            op: None,
        });
        for child in tree.child_ids(node).into_iter().rev() {
            stack.push((child, Some(index)));
        }
    }
    tracing::trace!("Flattened {} records under {}", records.len(), root);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keys() {
        let mut tree = DomTree::new();
        let text = tree.create_text("hello");
        let li = tree.create_element("li");
        let input = tree.create_element_with_attrs("input", &[("name", "T")]);
        let checkbox = tree.create_element_with_attrs("input", &[("type", "checkbox"), ("id", "c")]);

        assert_eq!(identity_key(&tree, text).unwrap(), "TEXT__hello");
        assert_eq!(identity_key(&tree, li).unwrap(), "li");
        assert_eq!(identity_key(&tree, input).unwrap(), "input__T__text");
        assert_eq!(identity_key(&tree, checkbox).unwrap(), "input__checkbox__c");
    }

    #[test]
    fn test_flatten_preorder() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let h1 = tree.create_element("h1");
        let title = tree.create_text("Test");
        let ul = tree.create_element("ul");
        tree.append_child(div, h1).unwrap();
        tree.append_child(h1, title).unwrap();
        tree.append_child(div, ul).unwrap();

        let records = flatten(&tree, div).unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["div", "div::h1", "div::h1::TEXT__Test", "div::ul"]
        );
        assert_eq!(records[2].depth, 3);
        assert_eq!(records[2].parent, Some(1));
        assert_eq!(records[3].parent, Some(0));
        assert!(records.iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[test]
    fn test_flatten_missing_root() {
        let tree = DomTree::new();
        assert!(flatten(&tree, NodeId::NONE).is_err());
    }
}
