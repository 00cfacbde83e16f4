//! Markup parser implementation
//!
//! Uses html5ever's RcDom and converts the result into the sdc arena.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use sdc_dom::{DocumentFragment, DomTree, NodeId};

use crate::{ParseError, ParseResult};

/// Markup parser
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    fn read(&self, markup: &str) -> ParseResult<RcDom> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut markup.as_bytes())?;
        Ok(dom)
    }

    /// Parse a fragment of markup into detached nodes.
    ///
    /// The markup is parsed as body content, so whitespace-only text
    /// between elements is kept as text nodes.
    pub fn parse_fragment(&self, tree: &mut DomTree, markup: &str) -> ParseResult<DocumentFragment> {
        let wrapped = format!("<!DOCTYPE html><html><head></head><body>{markup}</body></html>");
        let dom = self.read(&wrapped)?;
        let body = find_element(&dom.document, "body").ok_or(ParseError::MissingBody)?;

        let mut fragment = DocumentFragment::new();
        for child in body.children.borrow().iter() {
            if let Some(id) = self.convert_node(child, tree, None)? {
                fragment.append(id);
            }
        }
        tracing::trace!("Parsed fragment into {} top-level nodes", fragment.len());
        Ok(fragment)
    }

    /// Parse markup and append it under `parent`
    pub fn parse_into(&self, tree: &mut DomTree, parent: NodeId, markup: &str) -> ParseResult<Vec<NodeId>> {
        let mut fragment = self.parse_fragment(tree, markup)?;
        let nodes = fragment.take_children();
        for &node in &nodes {
            tree.append_child(parent, node)?;
        }
        Ok(nodes)
    }

    /// Parse a complete document into a fresh tree, returning the tree and
    /// its body element
    pub fn parse_document(&self, markup: &str) -> ParseResult<(DomTree, NodeId)> {
        let dom = self.read(markup)?;
        let mut tree = DomTree::new();
        let root = tree.root();
        for child in dom.document.children.borrow().iter() {
            self.convert_node(child, &mut tree, Some(root))?;
        }
        let body = tree
            .descendants(root)
            .into_iter()
            .find(|&id| tree.tag_name(id) == Some("body"))
            .ok_or(ParseError::MissingBody)?;
        tracing::debug!("Parsed document with {} nodes", tree.len());
        Ok((tree, body))
    }

    /// Convert an RcDom node (and its subtree) into the arena
    fn convert_node(
        &self,
        handle: &Handle,
        tree: &mut DomTree,
        parent: Option<NodeId>,
    ) -> ParseResult<Option<NodeId>> {
        let id = match &handle.data {
            RcNodeData::Text { contents } => tree.create_text(&contents.borrow()),
            RcNodeData::Comment { contents } => tree.create_comment(contents),
            RcNodeData::Element { name, attrs, .. } => {
                let id = tree.create_element(&name.local);
                if let Some(elem) = tree.element_mut(id) {
                    for attr in attrs.borrow().iter() {
                        elem.set_attr(&attr.name.local, attr.value.to_string());
                    }
                }
                for child in handle.children.borrow().iter() {
                    self.convert_node(child, tree, Some(id))?;
                }
                id
            }
            // Doctypes and processing instructions carry no content
            RcNodeData::Document
            | RcNodeData::Doctype { .. }
            | RcNodeData::ProcessingInstruction { .. } => return Ok(None),
        };
        if let Some(parent) = parent {
            tree.append_child(parent, id)?;
        }
        Ok(Some(id))
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &handle.data {
        if name.local.as_ref() == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}
