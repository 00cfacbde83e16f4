//! sdc HTML Parser
//!
//! Markup parsing built on html5ever. Parsed nodes land directly in an
//! existing `sdc_dom::DomTree`, either as a detached fragment or under a
//! given parent.

mod parser;

pub use parser::HtmlParser;

use sdc_dom::{DocumentFragment, DomTree, NodeId};

/// Result alias for parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read markup: {0}")]
    Read(#[from] std::io::Error),

    #[error("parsed document has no body element")]
    MissingBody,

    #[error(transparent)]
    Dom(#[from] sdc_dom::DomError),
}

/// Parse markup into detached top-level nodes of `tree`
pub fn parse_fragment(tree: &mut DomTree, markup: &str) -> ParseResult<DocumentFragment> {
    HtmlParser::new().parse_fragment(tree, markup)
}

/// Parse markup and append the resulting nodes to `parent`
pub fn parse_into(tree: &mut DomTree, parent: NodeId, markup: &str) -> ParseResult<Vec<NodeId>> {
    HtmlParser::new().parse_into(tree, parent, markup)
}
