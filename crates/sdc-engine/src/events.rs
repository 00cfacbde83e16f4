//! Event delegation
//!
//! Components declare `{event -> {selector -> handler}}` tables. The bus
//! marks matching nodes with an `sdc_<event>` attribute so a dispatched
//! event can find its way from the target back to the owning handlers.

use std::collections::{BTreeMap, HashMap};

use sdc_dom::{DomTree, NodeId, Selector};

use crate::component::ComponentId;
use crate::value::Value;

/// Prefix of the attribute that lists delegated handlers for one event
pub const EVENT_ATTR_PREFIX: &str = "sdc_";

/// Prefix of a table-backed handler token
pub const EVENT_TOKEN_PREFIX: &str = "this.event_";

/// Attribute name carrying the tokens for `event`
pub fn event_attr(event: &str) -> String {
    format!("{EVENT_ATTR_PREFIX}{event}")
}

/// Split an `sdc_<event>` attribute into handler tokens. A selector may
/// itself contain spaces, so a piece that does not start a new `this.`
/// token is glued back onto the previous one.
pub fn split_tokens(attr: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for piece in attr.split_whitespace() {
        match tokens.last_mut() {
            Some(last) if last.starts_with(EVENT_TOKEN_PREFIX) && !piece.starts_with("this.") => {
                last.push(' ');
                last.push_str(piece);
            }
            _ => tokens.push(piece.to_string()),
        }
    }
    tokens
}

/// Handler table of one component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTable {
    events: BTreeMap<String, BTreeMap<String, String>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`EventTable::add`]
    pub fn on(mut self, event: &str, selector: &str, handler: &str) -> Self {
        self.add(event, selector, handler);
        self
    }

    pub fn add(&mut self, event: &str, selector: &str, handler: &str) {
        self.events
            .entry(event.to_string())
            .or_default()
            .insert(selector.to_string(), handler.to_string());
    }

    /// Add the entries of `other` that this table does not define yet
    pub fn merge(&mut self, other: &EventTable) {
        for (event, selectors) in &other.events {
            let own = self.events.entry(event.clone()).or_default();
            for (selector, handler) in selectors {
                own.entry(selector.clone()).or_insert_with(|| handler.clone());
            }
        }
    }

    pub fn handler(&self, event: &str, selector: &str) -> Option<&str> {
        self.events.get(event)?.get(selector).map(String::as_str)
    }

    /// `(event, selector, handler)` triples in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.events.iter().flat_map(|(event, selectors)| {
            selectors
                .iter()
                .map(move |(selector, handler)| (event.as_str(), selector.as_str(), handler.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.events.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event bus the engine reports to
pub trait EventBus {
    /// Remember a component's handler table
    fn register(&mut self, component: ComponentId, table: &EventTable);

    /// Bind the component's handlers to the nodes currently under its
    /// container; runs after every structural change
    fn attach(&mut self, tree: &mut DomTree, component: ComponentId, container: NodeId);

    fn unregister_all(&mut self, component: ComponentId);

    /// Raise a named application event
    fn trigger(&mut self, event: &str, payload: Value);

    /// Handler registered by `component` for `event` on `selector`
    fn handler(&self, component: ComponentId, event: &str, selector: &str) -> Option<String>;

    /// Forget everything
    fn reset(&mut self) {}
}

/// Default bus: attribute-marked delegation plus a log of named events
#[derive(Debug, Default)]
pub struct DelegatedEvents {
    tables: HashMap<ComponentId, EventTable>,
    triggered: Vec<(String, Value)>,
}

impl DelegatedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, component: ComponentId) -> bool {
        self.tables.contains_key(&component)
    }

    /// Named events raised so far, oldest first
    pub fn triggered(&self) -> &[(String, Value)] {
        &self.triggered
    }
}

impl EventBus for DelegatedEvents {
    fn register(&mut self, component: ComponentId, table: &EventTable) {
        if !table.is_empty() {
            self.tables.insert(component, table.clone());
        }
    }

    fn attach(&mut self, tree: &mut DomTree, component: ComponentId, container: NodeId) {
        let Some(table) = self.tables.get(&component) else {
            return;
        };
        for (event, selector, _) in table.iter() {
            let Some(parsed) = Selector::parse(selector) else {
                tracing::warn!("Ignoring unparsable selector `{}` of {}", selector, component);
                continue;
            };
            let attr = event_attr(event);
            let token = format!("{EVENT_TOKEN_PREFIX}{selector}");
            for node in parsed.query_all(tree, container) {
                let mut tokens = tree.get_attr(node, &attr).map(split_tokens).unwrap_or_default();
                if tokens.contains(&token) {
                    continue;
                }
                tokens.push(token.clone());
                // only elements are matched, so this cannot fail
                let _ = tree.set_attr(node, &attr, &tokens.join(" "));
            }
        }
    }

    fn unregister_all(&mut self, component: ComponentId) {
        self.tables.remove(&component);
    }

    fn trigger(&mut self, event: &str, payload: Value) {
        tracing::debug!("Triggered application event `{}`", event);
        self.triggered.push((event.to_string(), payload));
    }

    fn handler(&self, component: ComponentId, event: &str, selector: &str) -> Option<String> {
        self.tables
            .get(&component)?
            .handler(event, selector)
            .map(str::to_string)
    }

    fn reset(&mut self) {
        self.tables.clear();
        self.triggered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_dom::InstanceRef;

    #[test]
    fn test_merge_keeps_existing() {
        let mut table = EventTable::new().on("click", ".a", "main");
        table.merge(&EventTable::new().on("click", ".a", "mixin").on("click", ".b", "other"));
        assert_eq!(table.handler("click", ".a"), Some("main"));
        assert_eq!(table.handler("click", ".b"), Some("other"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_split_tokens() {
        assert_eq!(
            split_tokens("this.event_li a this.event_.btn open"),
            vec!["this.event_li a", "this.event_.btn", "open"]
        );
        assert!(split_tokens("").is_empty());
    }

    #[test]
    fn test_attach_marks_once() {
        let mut tree = DomTree::new();
        let container = tree.create_element("my-view");
        let button = tree.create_element_with_attrs("button", &[("class", "go")]);
        tree.append_child(container, button).unwrap();

        let id = InstanceRef(1);
        let mut bus = DelegatedEvents::new();
        bus.register(id, &EventTable::new().on("click", ".go", "go"));
        bus.attach(&mut tree, id, container);
        bus.attach(&mut tree, id, container);

        assert_eq!(tree.get_attr(button, "sdc_click"), Some("this.event_.go"));
        assert_eq!(bus.handler(id, "click", ".go").as_deref(), Some("go"));

        bus.unregister_all(id);
        assert!(!bus.is_registered(id));
    }
}
