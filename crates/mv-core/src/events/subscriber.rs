//! Observer trait

use super::ViewEvent;

/// Trait for components that need to respond to pipeline changes.
///
/// Events are hints to re-derive state, not snapshots.
pub trait PipelineObserver: Send + Sync {
    /// Called on the owner thread whenever the visible records change
    fn on_event(&self, event: &ViewEvent);
}
