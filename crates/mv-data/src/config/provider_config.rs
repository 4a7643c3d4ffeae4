//! Remote provider settings

use serde::{Serialize, Deserialize};

use super::ConfigError;

/// Environment variable that overrides the provider base URL
pub const BASE_URL_ENV: &str = "MET_MUSEUM_API_DOMAIN";

/// Base URL used when neither an argument nor the environment sets one
pub const DEFAULT_BASE_URL: &str = "https://collectionapi.metmuseum.org";

/// Settings for the HTTP catalog provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Scheme and host of the collection API
    pub base_url: String,
    
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    
    /// Requests allowed per rolling one-second window
    pub max_requests_per_second: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 30_000,
            max_requests_per_second: 80,
        }
    }
}

impl ProviderConfig {
    /// Build a configuration whose base URL comes from `explicit`, then the
    /// environment, then the default
    pub fn resolve(explicit: Option<&str>) -> Self {
        let env = std::env::var(BASE_URL_ENV).ok();
        Self {
            base_url: resolve_base_url(explicit, env.as_deref()),
            ..Self::default()
        }
    }
    
    /// Parse a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    
    /// Check the values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.max_requests_per_second == 0 {
            return Err(ConfigError::ZeroCapacity { field: "max_requests_per_second" });
        }
        Ok(())
    }
}

/// Pick the base URL. An explicit value always wins over the environment.
pub fn resolve_base_url(explicit: Option<&str>, env: Option<&str>) -> String {
    fn usable(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|url| !url.is_empty())
    }

    usable(explicit)
        .or_else(|| usable(env))
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}
