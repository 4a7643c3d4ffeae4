//! Pipeline sizing

use serde::{Serialize, Deserialize};

use super::ConfigError;

/// Bounds applied by the staging pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records exposed by the window limiter
    pub window_capacity: usize,
    
    /// Query results kept by the LRU cache
    pub cache_capacity: usize,
    
    /// Search results longer than this are not cached. `None` caches any length.
    /// Bulk listings are exempt.
    pub max_cached_result_len: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 80,
            cache_capacity: 128,
            max_cached_result_len: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    
    /// Check the values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { field: "window_capacity" });
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { field: "cache_capacity" });
        }
        Ok(())
    }
    
    /// Builder-style window override
    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.window_capacity, 80);
        assert!(config.max_cached_result_len.is_none());
        assert!(config.validate().is_ok());
    }
    
    #[test]
    fn test_zero_window_rejected() {
        let err = PipelineConfig::from_json(r#"{ "window_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity { field: "window_capacity" }));
    }
    
    #[test]
    fn test_result_cap_from_json() {
        let config = PipelineConfig::from_json(r#"{ "max_cached_result_len": 5000 }"#).unwrap();
        assert_eq!(config.max_cached_result_len, Some(5000));
        assert_eq!(config.cache_capacity, 128);
    }
}
