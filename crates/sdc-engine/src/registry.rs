//! Tag registry
//!
//! Maps tag names to controller factories along with their registry-level
//! mixins, parameter overrides and the global (singleton) flag.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use crate::controller::Controller;
use crate::params::kebab_case;

/// Builds a fresh controller for one instance
pub type Factory = Rc<dyn Fn() -> Box<dyn Controller>>;

/// Separator between the host tag and its mixin tags
pub const MIXIN_SEPARATOR: char = '_';

/// One registered tag
#[derive(Clone)]
pub struct Registration {
    pub(crate) factory: Factory,
    pub(crate) mixins: Vec<String>,
    pub(crate) init_params: Option<Vec<String>>,
    pub(crate) global: bool,
}

impl Registration {
    pub fn mixins(&self) -> &[String] {
        &self.mixins
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn init_params(&self) -> Option<&[String]> {
        self.init_params.as_deref()
    }

    pub(crate) fn build(&self) -> Box<dyn Controller> {
        (self.factory)()
    }
}

/// Tag registry
#[derive(Default, Clone)]
pub struct TagRegistry {
    entries: HashMap<String, Registration>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a tag
    pub fn register(&mut self, tag: &str, factory: Factory) -> &mut Registration {
        let tag = tag.to_ascii_lowercase();
        tracing::debug!("Registered tag <{}>", tag);
        let registration = Registration {
            factory,
            mixins: Vec::new(),
            init_params: None,
            global: false,
        };
        match self.entries.entry(tag) {
            Entry::Occupied(mut slot) => {
                slot.insert(registration);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(registration),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Registration> {
        self.entries.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Registration> {
        self.entries.get_mut(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Split a host tag such as `main-view_logger` into the registered tag
    /// and the mixin names it carries. `None` when the first segment is not
    /// registered.
    pub fn match_host_tag(&self, name: &str) -> Option<(String, Vec<String>)> {
        let mut segments = name.split(MIXIN_SEPARATOR);
        let tag = segments.next()?;
        if !self.contains(tag) {
            return None;
        }
        let mixins = segments
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Some((tag.to_string(), mixins))
    }

    /// Host-tag mixins plus registry-level mixins, closed transitively
    /// over each mixin's own registry mixins, without duplicates
    pub fn resolve_mixins(&self, tag: &str, host_mixins: &[String]) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::new();
        let mut queue: Vec<String> = host_mixins.to_vec();
        if let Some(registration) = self.get(tag) {
            queue.extend(registration.mixins.iter().cloned());
        }
        let mut cursor = 0;
        while cursor < queue.len() {
            let next = queue[cursor].clone();
            cursor += 1;
            if next == tag || resolved.contains(&next) {
                continue;
            }
            let Some(registration) = self.get(&next) else {
                tracing::warn!("Unknown mixin <{}> on <{}>, skipped", next, tag);
                continue;
            };
            queue.extend(registration.mixins.iter().cloned());
            resolved.push(next);
        }
        resolved
    }
}

/// Derive the tag for a controller type: `crate::MainViewController`
/// becomes `main-view`
pub fn tag_for_type(type_name: &str) -> String {
    let short = type_name
        .split('<')
        .next()
        .unwrap_or(type_name)
        .rsplit("::")
        .next()
        .unwrap_or(type_name);
    let tag = kebab_case(short);
    match tag.strip_suffix("-controller") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => tag,
    }
}
