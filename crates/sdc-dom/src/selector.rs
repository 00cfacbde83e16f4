//! Simple selector matching
//!
//! Supports compound selectors (`tag`, `.class`, `#id`, `[attr]`,
//! `[attr=value]`, `*`) joined by the descendant combinator.

use crate::{DomTree, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Universal,
    Tag(String),
    Class(String),
    Id(String),
    Attr { name: String, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound(Vec<Simple>);

/// Parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Compounds from outermost to the subject
    compounds: Vec<Compound>,
}

impl Selector {
    /// Parse a selector, returning `None` for unsupported syntax
    pub fn parse(input: &str) -> Option<Self> {
        let compounds = input
            .split_whitespace()
            .map(parse_compound)
            .collect::<Option<Vec<_>>>()?;
        if compounds.is_empty() {
            return None;
        }
        Some(Self { compounds })
    }

    /// Check whether `node` matches
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some((subject, rest)) = self.compounds.split_last() else {
            return false;
        };
        if !subject.matches(tree, node) {
            return false;
        }
        let mut ancestors = tree.ancestors(node);
        rest.iter()
            .rev()
            .all(|compound| ancestors.any(|a| compound.matches(tree, a)))
    }

    /// All descendants of `root` (excluding `root`) matching the selector
    pub fn query_all(&self, tree: &DomTree, root: NodeId) -> Vec<NodeId> {
        tree.descendants(root)
            .into_iter()
            .filter(|&node| self.matches(tree, node))
            .collect()
    }
}

impl Compound {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(elem) = tree.element(node) else {
            return false;
        };
        self.0.iter().all(|simple| match simple {
            Simple::Universal => true,
            Simple::Tag(tag) => elem.name == *tag,
            Simple::Class(class) => elem.has_class(class),
            Simple::Id(id) => elem.id() == Some(id.as_str()),
            Simple::Attr { name, value: None } => elem.has_attr(name),
            Simple::Attr { name, value: Some(v) } => elem.get_attr(name) == Some(v.as_str()),
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_')
}

fn take_ident(input: &str) -> (&str, &str) {
    let end = input
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    input.split_at(end)
}

fn parse_compound(mut input: &str) -> Option<Compound> {
    let mut parts = Vec::new();
    if let Some(rest) = input.strip_prefix('*') {
        parts.push(Simple::Universal);
        input = rest;
    } else if input.starts_with(is_ident_char) {
        let (tag, rest) = take_ident(input);
        parts.push(Simple::Tag(tag.to_ascii_lowercase()));
        input = rest;
    }
    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix('.') {
            let (class, rest) = take_ident(rest);
            if class.is_empty() {
                return None;
            }
            parts.push(Simple::Class(class.to_string()));
            input = rest;
        } else if let Some(rest) = input.strip_prefix('#') {
            let (id, rest) = take_ident(rest);
            if id.is_empty() {
                return None;
            }
            parts.push(Simple::Id(id.to_string()));
            input = rest;
        } else if let Some(rest) = input.strip_prefix('[') {
            let end = rest.find(']')?;
            let body = &rest[..end];
            let attr = match body.split_once('=') {
                Some((name, value)) => Simple::Attr {
                    name: name.trim().to_string(),
                    value: Some(value.trim().trim_matches(['"', '\'']).to_string()),
                },
                None => Simple::Attr {
                    name: body.trim().to_string(),
                    value: None,
                },
            };
            parts.push(attr);
            input = &rest[end + 1..];
        } else {
            return None;
        }
    }
    (!parts.is_empty()).then_some(Compound(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let section = tree.create_element_with_attrs("section", &[("id", "main")]);
        let button = tree.create_element_with_attrs("button", &[("class", "btn primary"), ("type", "submit")]);
        let span = tree.create_element("span");
        tree.append_child(tree.root(), section).unwrap();
        tree.append_child(section, button).unwrap();
        tree.append_child(button, span).unwrap();
        (tree, section, button, span)
    }

    #[test]
    fn test_compound_selectors() {
        let (tree, _, button, span) = sample();
        assert!(Selector::parse("button.btn").unwrap().matches(&tree, button));
        assert!(Selector::parse(".primary[type=submit]").unwrap().matches(&tree, button));
        assert!(!Selector::parse(".secondary").unwrap().matches(&tree, button));
        assert!(Selector::parse("*").unwrap().matches(&tree, span));
    }

    #[test]
    fn test_descendant_combinator() {
        let (tree, section, _, span) = sample();
        let sel = Selector::parse("#main span").unwrap();
        assert!(sel.matches(&tree, span));
        assert_eq!(sel.query_all(&tree, section), vec![span]);
        assert!(Selector::parse("#other span").unwrap().query_all(&tree, section).is_empty());
    }

    #[test]
    fn test_invalid_selector() {
        assert!(Selector::parse("").is_none());
        assert!(Selector::parse("div > p").is_none());
        assert!(Selector::parse("[open").is_none());
    }
}
