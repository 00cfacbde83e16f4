//! DOM Node
//!
//! Linked arena node: parent/child/sibling links are `NodeId`s into the
//! owning `DomTree`, so moving a node never invalidates references to it.

use crate::{InstanceRef, NodeId};

/// DOM Node - Core structure
#[derive(Debug, Clone)]
pub struct Node {
    /// Parent node (NONE if detached or root)
    pub parent: NodeId,
    /// First child
    pub first_child: NodeId,
    /// Last child (for O(1) append)
    pub last_child: NodeId,
    /// Previous sibling
    pub prev_sibling: NodeId,
    /// Next sibling
    pub next_sibling: NodeId,
    /// Node-specific data
    pub data: NodeData,
    /// Reserved slot holding the component instance mounted on this node
    pub instance: Option<InstanceRef>,
    /// Set once the node has been removed and its slot freed
    pub(crate) removed: bool,
    /// Bumped every time the slot is freed
    pub(crate) generation: u32,
}

impl Node {
    fn unlinked(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            data,
            instance: None,
            removed: false,
            generation: 0,
        }
    }

    /// Create a new element node
    pub fn element(name: &str) -> Self {
        Self::unlinked(NodeData::Element(ElementData::new(name)))
    }

    /// Create a new text node
    pub fn text(content: impl Into<String>) -> Self {
        Self::unlinked(NodeData::Text(TextData { content: content.into() }))
    }

    /// Create a comment node
    pub fn comment(content: impl Into<String>) -> Self {
        Self::unlinked(NodeData::Comment(content.into()))
    }

    /// Create a document node
    pub fn document() -> Self {
        Self::unlinked(NodeData::Document)
    }

    pub(crate) fn with_data(data: NodeData) -> Self {
        Self::unlinked(data)
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Check if this is text
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(elem) => Some(elem),
            _ => None,
        }
    }

    /// Get mutable element data if this is an element
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(elem) => Some(elem),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(text) => Some(&text.content),
            _ => None,
        }
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.first_child.is_valid()
    }
}

/// Node data variants
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Document root
    Document,
    /// Element node
    Element(ElementData),
    /// Text node
    Text(TextData),
    /// Comment node
    Comment(String),
}

/// Element-specific data
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Lowercase tag name
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<Attribute>,
}

impl ElementData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|attr| attr.name == name)
    }

    /// Set an attribute, returning true when the stored value changed
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.attrs.iter_mut().find(|attr| attr.name == name) {
            Some(attr) if attr.value == value => false,
            Some(attr) => {
                attr.value = value;
                true
            }
            None => {
                self.attrs.push(Attribute {
                    name: name.to_string(),
                    value,
                });
                true
            }
        }
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|attr| attr.name == name)?;
        Some(self.attrs.remove(pos).value)
    }

    /// Element id attribute
    pub fn id(&self) -> Option<&str> {
        self.get_attr("id")
    }

    /// Whitespace separated class list
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get_attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// `data-*` attributes with the prefix stripped
    pub fn data_attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().filter_map(|attr| {
            attr.name
                .strip_prefix("data-")
                .map(|key| (key, attr.value.as_str()))
        })
    }

    /// Check if this is an input element
    pub fn is_input(&self) -> bool {
        self.name == "input"
    }
}

/// A single attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Text node data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextData {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_attrs() {
        let mut elem = ElementData::new("DIV");
        assert_eq!(elem.name, "div");
        assert!(elem.set_attr("id", "main"));
        assert!(!elem.set_attr("id", "main"));
        assert!(elem.set_attr("class", "a  b"));
        assert_eq!(elem.id(), Some("main"));
        assert!(elem.has_class("b"));
        assert_eq!(elem.remove_attr("id"), Some("main".to_string()));
        assert!(!elem.has_attr("id"));
    }

    #[test]
    fn test_data_attrs() {
        let mut elem = ElementData::new("div");
        elem.set_attr("data-user-id", "4");
        elem.set_attr("title", "x");
        let data: Vec<_> = elem.data_attrs().collect();
        assert_eq!(data, vec![("user-id", "4")]);
    }
}
