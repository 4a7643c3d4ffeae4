//! Data staging pipeline for browsing a large remote catalog
//!
//! Layers, bottom-up: [`RecordStore`] owns the identifiers of the current
//! query, [`WindowLimiter`] exposes a bounded prefix of them,
//! [`DeferredEnrichment`] answers reads with placeholders while details are
//! fetched in the background, and [`OrderingFilter`] sorts and filters what
//! is exposed. [`Pipeline`] composes them behind the consumer-facing API.

pub mod cache;
pub mod config;
pub mod enrichment;
pub mod ordering;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod window;

#[cfg(test)]
mod testing;

use mv_core::{Generation, Record, ViewEvent};

// Re-exports
pub use cache::{CacheStats, QueryCache};
pub use config::{ConfigError, PipelineConfig, ProviderConfig};
pub use enrichment::{Completion, DeferredEnrichment, ResolutionCounts};
pub use ordering::{OrderingFilter, RecordFilter, RecordPredicate, SortKey, SortOrder, SortSpec};
pub use pipeline::{LoadStatistics, Pipeline};
pub use sources::{MemorySource, MetMuseumSource};
pub use store::{QueryRunner, RecordStore};
pub use window::WindowLimiter;

/// Read contract shared by every layer.
///
/// Reads never block on I/O. `record_at` takes `&mut self` because a layer
/// may schedule background work on a read.
pub trait RecordView {
    /// Number of records this layer exposes
    fn count(&self) -> usize;
    
    /// Snapshot of the record at `index`. Out-of-range reads are an error.
    fn record_at(&mut self, index: usize) -> mv_core::Result<Record>;
    
    /// Generation of the underlying record set
    fn generation(&self) -> Generation;
}

/// Layers that re-derive their state from notifications of the layer below
pub trait SourceObserver {
    /// Translate an event from below into this layer's own event, if any
    fn on_source_event(&mut self, event: ViewEvent) -> Option<ViewEvent>;
}
