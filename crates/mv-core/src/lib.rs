//! Core vocabulary for the catalog viewer
//! 
//! This crate provides the record model, query keys, the remote provider
//! boundary and the notification plumbing shared by every pipeline layer.

pub mod events;
pub mod provider;
pub mod query;
pub mod record;

use thiserror::Error;

// Re-export commonly used types
pub use events::{observer_from_fn, Notifier, PipelineObserver, Subscription, ViewEvent};
pub use provider::CatalogProvider;
pub use query::{Generation, Query, KNOWN_CLASSIFICATIONS};
pub use record::{ObjectId, Record, RecordDetails, ResolutionState, Year};

/// Errors reported by a remote catalog provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport, status or decoding failure on the backend
    #[error("provider request failed: {0}")]
    Backend(String),
    
    /// The identifier no longer resolves to an object
    #[error("object {0} was not found")]
    NotFound(ObjectId),
}

/// Errors that can occur while reading or driving the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A read went past the number of exposed records
    #[error("index {index} is out of range (count: {count})")]
    InvalidIndex { index: usize, count: usize },
    
    #[error(transparent)]
    Provider(#[from] ProviderError),
    
    /// A background result that belongs to a superseded query generation.
    /// The pipeline drops these; its public operations never return one.
    #[error("stale completion for object {identifier} from generation {generation}")]
    StaleCompletion { identifier: ObjectId, generation: Generation },
}

/// Result alias used across the pipeline crates
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
