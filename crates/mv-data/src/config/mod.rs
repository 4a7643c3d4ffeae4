//! Pipeline and provider configuration

pub mod pipeline_config;
pub mod provider_config;

pub use pipeline_config::*;
pub use provider_config::*;

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    
    #[error("{field} must be at least 1")]
    ZeroCapacity { field: &'static str },
    
    #[error("base URL {0:?} must start with http:// or https://")]
    InvalidBaseUrl(String),
}
