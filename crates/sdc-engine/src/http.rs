//! HTTP content loader
//!
//! Fetches content with a blocking reqwest client on smol's blocking
//! thread pool, so the local executor is never stalled.

use std::sync::Arc;
use std::time::Duration;

use smol::future::{BoxedLocal, FutureExt};
use url::Url;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::loader::{ContentLoader, LoadFailure, LoadRequest};

/// Loader for content served over HTTP
#[derive(Clone)]
pub struct HttpLoader {
    client: Arc<reqwest::blocking::Client>,
    base: Option<Url>,
}

impl HttpLoader {
    pub fn new(config: &AppConfig) -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(30))
            // a 301 has to reach the engine
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let base = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|err| EngineError::Url(err.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            base,
        })
    }

    /// Absolute URL of a request, query included
    pub fn resolve(&self, request: &LoadRequest) -> Result<Url, url::ParseError> {
        let mut url = match &self.base {
            Some(base) => base.join(&request.url)?,
            None => Url::parse(&request.url)?,
        };
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

fn fetch(client: &reqwest::blocking::Client, url: Url) -> Result<String, LoadFailure> {
    let response = client
        .get(url)
        .send()
        .map_err(|err| LoadFailure::transport(err.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| LoadFailure::transport(err.to_string()))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(LoadFailure::new(status.as_u16(), body))
    }
}

impl ContentLoader for HttpLoader {
    fn load(&self, request: LoadRequest) -> BoxedLocal<Result<String, LoadFailure>> {
        let url = match self.resolve(&request) {
            Ok(url) => url,
            Err(err) => {
                return smol::future::ready(Err(LoadFailure::transport(format!(
                    "invalid content url `{}`: {}",
                    request.url, err
                ))))
                .boxed_local();
            }
        };
        tracing::info!("Loading content for <{}> from {}", request.cache_key, url);
        let client = Arc::clone(&self.client);
        smol::unblock(move || fetch(&client, url)).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> LoadRequest {
        LoadRequest {
            url: url.to_string(),
            query: vec![("VERSION".into(), "0.0".into()), ("_method".into(), "content".into())],
            cache_key: "view".into(),
            force_reload: false,
        }
    }

    #[test]
    fn test_resolve_against_base() {
        let config = AppConfig {
            base_url: Some("http://localhost:8000/app/".into()),
            ..AppConfig::default()
        };
        let loader = HttpLoader::new(&config).unwrap();
        let url = loader.resolve(&request("views/main")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/app/views/main?VERSION=0.0&_method=content"
        );
    }

    #[test]
    fn test_relative_without_base_fails() {
        let loader = HttpLoader::new(&AppConfig::default()).unwrap();
        assert!(loader.resolve(&request("views/main")).is_err());

        let failure = smol::block_on(loader.load(request("views/main"))).unwrap_err();
        assert_eq!(failure.status, 0);
    }

    #[test]
    fn test_invalid_base_is_config_error() {
        let config = AppConfig {
            base_url: Some("not a url".into()),
            ..AppConfig::default()
        };
        assert!(matches!(HttpLoader::new(&config), Err(EngineError::Url(_))));
    }
}
