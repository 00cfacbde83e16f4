//! Content cache
//!
//! Loaded markup keyed by tag name. Invalidated wholesale.

use std::collections::HashMap;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Markup cache shared by every instance of the application
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: HashMap<String, String>,
    hits: u64,
    misses: u64,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached markup for a tag
    pub fn get(&mut self, tag: &str) -> Option<String> {
        match self.entries.get(tag) {
            Some(markup) => {
                self.hits += 1;
                Some(markup.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, tag: &str, markup: String) {
        self.entries.insert(tag.to_string(), markup);
    }

    pub fn clear(&mut self) {
        tracing::debug!("Cleared {} cached content entries", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ContentCache::new();
        assert!(cache.get("view").is_none());
        cache.put("view", "<p>x</p>".into());
        assert_eq!(cache.get("view").as_deref(), Some("<p>x</p>"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = ContentCache::new();
        cache.put("a", String::new());
        cache.put("b", String::new());
        cache.clear();
        assert!(cache.is_empty());
    }
}
