//! Markup serialization (inner/outer)
//!
//! Key features:
//! - innerHTML/outerHTML serialization
//! - Proper escaping of text and attribute values
//! - Void element handling

use crate::{DomTree, NodeData, NodeId};

/// Markup serializer
pub struct HtmlSerializer {
    /// Whether to format output with indentation
    pub pretty_print: bool,
    /// Indentation string
    pub indent: String,
}

/// Void elements (no end tag)
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Raw text elements (no escaping for content)
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Default for HtmlSerializer {
    fn default() -> Self {
        Self {
            pretty_print: false,
            indent: "  ".to_string(),
        }
    }
}

impl HtmlSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self {
            pretty_print: true,
            ..Self::default()
        }
    }

    /// Serialize the children of a node
    pub fn serialize_inner(&self, tree: &DomTree, node_id: NodeId) -> String {
        let mut output = String::new();
        for (child, _) in tree.children(node_id) {
            self.serialize_node(tree, child, &mut output, 0);
        }
        output
    }

    /// Serialize a node including itself
    pub fn serialize_outer(&self, tree: &DomTree, node_id: NodeId) -> String {
        let mut output = String::new();
        self.serialize_node(tree, node_id, &mut output, 0);
        output
    }

    fn newline(&self, output: &mut String, depth: usize) {
        if self.pretty_print && !output.is_empty() {
            output.push('\n');
            for _ in 0..depth {
                output.push_str(&self.indent);
            }
        }
    }

    fn serialize_node(&self, tree: &DomTree, node_id: NodeId, output: &mut String, depth: usize) {
        let Some(node) = tree.get(node_id) else {
            return;
        };

        match &node.data {
            NodeData::Document => {
                for (child, _) in tree.children(node_id) {
                    self.serialize_node(tree, child, output, depth);
                }
            }
            NodeData::Element(elem) => {
                let tag = elem.name.as_str();
                self.newline(output, depth);
                output.push('<');
                output.push_str(tag);
                for attr in &elem.attrs {
                    output.push(' ');
                    output.push_str(&attr.name);
                    if !attr.value.is_empty() {
                        output.push_str("=\"");
                        escape_attribute(&attr.value, output);
                        output.push('"');
                    }
                }
                output.push('>');
                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }

                if RAW_TEXT_ELEMENTS.contains(&tag) {
                    for (_, child) in tree.children(node_id) {
                        if let Some(text) = child.as_text() {
                            output.push_str(text);
                        }
                    }
                } else {
                    for (child, _) in tree.children(node_id) {
                        self.serialize_node(tree, child, output, depth + 1);
                    }
                }

                if node.has_children() && tree.children(node_id).any(|(_, c)| c.is_element()) {
                    self.newline(output, depth);
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeData::Text(text) => {
                if self.pretty_print {
                    let trimmed = text.content.trim();
                    if !trimmed.is_empty() {
                        escape_text(trimmed, output);
                    }
                } else {
                    escape_text(&text.content, output);
                }
            }
            NodeData::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
        }
    }
}

/// Escape text content
fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_outer() {
        let mut tree = DomTree::new();
        let li = tree.create_element_with_attrs("li", &[("class", "a<b"), ("hidden", "")]);
        let text = tree.create_text("A & B");
        let input = tree.create_element_with_attrs("input", &[("name", "T")]);
        tree.append_child(li, text).unwrap();
        tree.append_child(li, input).unwrap();

        let html = HtmlSerializer::new().serialize_outer(&tree, li);
        assert_eq!(html, r#"<li class="a&lt;b" hidden>A &amp; B<input name="T"></li>"#);
    }

    #[test]
    fn test_serialize_inner_skips_self() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let p = tree.create_element("p");
        let comment = tree.create_comment("note");
        tree.append_child(div, p).unwrap();
        tree.append_child(div, comment).unwrap();
        assert_eq!(HtmlSerializer::new().serialize_inner(&tree, div), "<p></p><!--note-->");
    }

    #[test]
    fn test_pretty_print_indents_elements() {
        let mut tree = DomTree::new();
        let ul = tree.create_element("ul");
        let li = tree.create_element("li");
        tree.append_child(ul, li).unwrap();
        let html = HtmlSerializer::pretty().serialize_outer(&tree, ul);
        assert_eq!(html, "<ul>\n  <li></li>\n</ul>");
    }
}
