//! Application configuration
//!
//! Loadable from JSON, with `SDC_*` environment overrides.

use serde::Deserialize;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Forwarded as `VERSION` with every content request
    pub version: String,
    /// Enables debug-level logging in the CLI
    pub debug: bool,
    /// Base for relative content URLs
    pub base_url: Option<String>,
    /// Tag name of the body container
    pub root_tag: String,
    /// User agent sent by the HTTP loader
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.0".to_string(),
            debug: false,
            base_url: None,
            root_tag: "body".to_string(),
            user_agent: format!("sdc/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    /// Parse a JSON configuration document; missing keys keep defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply `SDC_VERSION`, `SDC_DEBUG`, `SDC_BASE_URL` and
    /// `SDC_USER_AGENT` from the process environment
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(version) = lookup("SDC_VERSION") {
            self.version = version;
        }
        if let Some(debug) = lookup("SDC_DEBUG") {
            self.debug = match debug.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SDC_DEBUG",
                        value: debug,
                    })
                }
            };
        }
        if let Some(base) = lookup("SDC_BASE_URL") {
            self.base_url = (!base.is_empty()).then_some(base);
        }
        if let Some(agent) = lookup("SDC_USER_AGENT") {
            self.user_agent = agent;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.version, "0.0");
        assert_eq!(config.root_tag, "body");
        assert!(!config.debug);
    }

    #[test]
    fn test_from_json_partial() {
        let config = AppConfig::from_json(r#"{"version": "1.2", "debug": true}"#).unwrap();
        assert_eq!(config.version, "1.2");
        assert!(config.debug);
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            AppConfig::from_json("{version"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            [("SDC_VERSION", "9"), ("SDC_DEBUG", "on"), ("SDC_BASE_URL", "http://x/")].into();
        let config = AppConfig::default()
            .with_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.version, "9");
        assert!(config.debug);
        assert_eq!(config.base_url.as_deref(), Some("http://x/"));
    }

    #[test]
    fn test_env_invalid_flag() {
        let err = AppConfig::default()
            .with_vars(|key| (key == "SDC_DEBUG").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "SDC_DEBUG", .. }));
    }
}
