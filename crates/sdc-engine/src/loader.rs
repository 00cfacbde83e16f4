//! Content loading
//!
//! The engine asks a [`ContentLoader`] for the markup behind a content
//! URL. [`StaticLoader`] serves markup from memory; the HTTP loader lives
//! in [`crate::http`].

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Deserialize;
use smol::future::{BoxedLocal, FutureExt};
use thiserror::Error;

/// Status that makes the engine raise a redirect
pub const STATUS_MOVED: u16 = 301;

/// One content request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Tag the content belongs to
    pub cache_key: String,
    /// The caller will not cache the result
    pub force_reload: bool,
}

impl LoadRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A failed load: non-2xx status with the response body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("content request failed with status {status}")]
pub struct LoadFailure {
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize)]
struct MovedBody {
    #[serde(rename = "url-link")]
    url_link: Option<String>,
}

impl LoadFailure {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Transport level failure without a response
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn is_moved(&self) -> bool {
        self.status == STATUS_MOVED
    }

    /// `url-link` of a JSON body
    pub fn redirect_target(&self) -> Option<String> {
        serde_json::from_str::<MovedBody>(&self.body)
            .ok()
            .and_then(|body| body.url_link)
    }

    /// Markup rendered in place of the missing content
    pub fn to_markup(&self) -> String {
        format!(r#"<sdc-error data-code="{}">{}</sdc-error>"#, self.status, self.body)
    }
}

/// Source of component content
pub trait ContentLoader {
    fn load(&self, request: LoadRequest) -> BoxedLocal<Result<String, LoadFailure>>;
}

/// In-memory loader keyed by URL
#[derive(Debug, Default)]
pub struct StaticLoader {
    pages: RefCell<HashMap<String, String>>,
    failures: RefCell<HashMap<String, LoadFailure>>,
    calls: RefCell<Vec<LoadRequest>>,
    suspend: bool,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the executor once before answering
    pub fn suspending(mut self) -> Self {
        self.suspend = true;
        self
    }

    pub fn with_page(self, url: &str, markup: &str) -> Self {
        self.set_page(url, markup);
        self
    }

    pub fn with_failure(self, url: &str, status: u16, body: &str) -> Self {
        self.failures
            .borrow_mut()
            .insert(url.to_string(), LoadFailure::new(status, body));
        self
    }

    pub fn set_page(&self, url: &str, markup: &str) {
        self.failures.borrow_mut().remove(url);
        self.pages.borrow_mut().insert(url.to_string(), markup.to_string());
    }

    /// Every request seen so far
    pub fn calls(&self) -> Vec<LoadRequest> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.borrow().iter().filter(|r| r.url == url).count()
    }

    fn answer(&self, url: &str) -> Result<String, LoadFailure> {
        if let Some(failure) = self.failures.borrow().get(url) {
            return Err(failure.clone());
        }
        self.pages
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| LoadFailure::new(404, format!("no content at {url}")))
    }
}

impl ContentLoader for StaticLoader {
    fn load(&self, request: LoadRequest) -> BoxedLocal<Result<String, LoadFailure>> {
        let result = self.answer(&request.url);
        self.calls.borrow_mut().push(request);
        if self.suspend {
            async move {
                smol::future::yield_now().await;
                result
            }
            .boxed_local()
        } else {
            smol::future::ready(result).boxed_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> LoadRequest {
        LoadRequest {
            url: url.to_string(),
            query: vec![("VERSION".into(), "1".into())],
            cache_key: "x".into(),
            force_reload: false,
        }
    }

    #[test]
    fn test_failure_markup() {
        let failure = LoadFailure::new(404, "Not here");
        assert_eq!(failure.to_markup(), r#"<sdc-error data-code="404">Not here</sdc-error>"#);
        assert!(!failure.is_moved());
    }

    #[test]
    fn test_redirect_target() {
        let failure = LoadFailure::new(301, r#"{"url-link": "/login"}"#);
        assert!(failure.is_moved());
        assert_eq!(failure.redirect_target().as_deref(), Some("/login"));
        assert_eq!(LoadFailure::new(301, "<p>").redirect_target(), None);
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticLoader::new()
            .with_page("/a", "<p>a</p>")
            .with_failure("/b", 500, "boom");
        assert_eq!(smol::block_on(loader.load(request("/a"))).unwrap(), "<p>a</p>");
        assert_eq!(smol::block_on(loader.load(request("/b"))).unwrap_err().status, 500);
        assert_eq!(smol::block_on(loader.load(request("/c"))).unwrap_err().status, 404);
        assert_eq!(loader.call_count(), 3);
        assert_eq!(loader.calls()[0].query_value("VERSION"), Some("1"));
    }
}
