//! Deferred enrichment
//!
//! Reads are answered immediately. A record without details gets placeholder
//! fields and a background fetch is scheduled for it; the fetch result comes
//! back over a channel as a [`Completion`] and is applied by the owner of the
//! layer with [`DeferredEnrichment::apply`]. Completions carry the generation
//! they were scheduled under, so results that arrive after the record set was
//! replaced are dropped instead of landing on the wrong record.

use std::sync::Arc;
use ahash::AHashMap;
use mv_core::{
    CatalogProvider, Generation, ObjectId, PipelineError, ProviderError, Record, RecordDetails, ResolutionState,
    ViewEvent,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{RecordView, SourceObserver};

/// Outcome of one background detail fetch
#[derive(Debug)]
pub struct Completion {
    /// Generation the fetch was scheduled under
    pub generation: Generation,
    pub identifier: ObjectId,
    pub result: Result<RecordDetails, ProviderError>,
}

#[derive(Debug, Clone)]
struct Resolution {
    state: ResolutionState,
    details: Option<Arc<RecordDetails>>,
}

/// Number of records in each non-initial state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionCounts {
    pub pending: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Attaches details to records, fetching them lazily on first read
pub struct DeferredEnrichment<V> {
    inner: V,
    provider: Arc<dyn CatalogProvider>,
    runtime: Handle,
    completions: UnboundedSender<Completion>,
    resolutions: AHashMap<ObjectId, Resolution>,
    /// Checked and set under one lock: at most one fetch per identifier
    in_flight: Mutex<AHashMap<ObjectId, JoinHandle<()>>>,
    positions: AHashMap<ObjectId, usize>,
    generation: Generation,
    stale_completions: u64,
}

impl<V: RecordView> DeferredEnrichment<V> {
    /// Wrap `inner`. Fetches run on `runtime` and report to `completions`.
    pub fn new(
        inner: V,
        provider: Arc<dyn CatalogProvider>,
        runtime: Handle,
        completions: UnboundedSender<Completion>,
    ) -> Self {
        let generation = inner.generation();
        let mut layer = Self {
            inner,
            provider,
            runtime,
            completions,
            resolutions: AHashMap::new(),
            in_flight: Mutex::new(AHashMap::new()),
            positions: AHashMap::new(),
            generation,
            stale_completions: 0,
        };
        layer.rebuild_positions();
        layer
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut V {
        &mut self.inner
    }

    /// Number of fetches currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Completions dropped because their generation was superseded
    pub fn stale_completions(&self) -> u64 {
        self.stale_completions
    }

    pub fn counts(&self) -> ResolutionCounts {
        let mut counts = ResolutionCounts::default();
        for resolution in self.resolutions.values() {
            match resolution.state {
                ResolutionState::Pending => counts.pending += 1,
                ResolutionState::Resolved => counts.resolved += 1,
                ResolutionState::Failed => counts.failed += 1,
                ResolutionState::Unresolved => {}
            }
        }
        counts
    }

    /// Apply a finished fetch.
    ///
    /// Returns the change to report upstream, or `StaleCompletion` when the
    /// fetch belongs to a replaced record set. Stale results mutate nothing.
    pub fn apply(&mut self, completion: Completion) -> Result<Option<ViewEvent>, PipelineError> {
        let Completion {
            generation,
            identifier,
            result,
        } = completion;

        if generation != self.generation {
            self.stale_completions += 1;
            debug!(%identifier, %generation, current = %self.generation, "dropping stale completion");
            return Err(PipelineError::StaleCompletion { identifier, generation });
        }

        self.in_flight.lock().remove(&identifier);

        let (state, details) = match result {
            Ok(details) => {
                debug!(%identifier, title = %details.title, "details resolved");
                (ResolutionState::Resolved, Some(Arc::new(details)))
            }
            Err(e) => {
                warn!(%identifier, error = %e, "failed to fetch details, keeping placeholder");
                (ResolutionState::Failed, None)
            }
        };

        if !self.transition(identifier, state, details) {
            return Ok(None);
        }

        Ok(self.positions.get(&identifier).map(|index| ViewEvent::RecordChanged(*index)))
    }

    /// Move a failed record back to unresolved so the next read fetches it again.
    /// Inside a [`crate::Pipeline`] that read happens at once, when the ordering
    /// layer handles the returned event.
    pub fn retry(&mut self, identifier: ObjectId) -> Option<ViewEvent> {
        match self.resolutions.get(&identifier) {
            Some(resolution) if resolution.state == ResolutionState::Failed => {
                self.resolutions.remove(&identifier);
                info!(%identifier, "retrying detail fetch");
                self.positions.get(&identifier).map(|index| ViewEvent::RecordChanged(*index))
            }
            _ => None,
        }
    }

    fn state_of(&self, identifier: ObjectId) -> ResolutionState {
        self.resolutions
            .get(&identifier)
            .map(|r| r.state)
            .unwrap_or(ResolutionState::Unresolved)
    }

    fn transition(&mut self, identifier: ObjectId, next: ResolutionState, details: Option<Arc<RecordDetails>>) -> bool {
        let current = self.state_of(identifier);
        if !current.can_advance_to(next) {
            debug!(%identifier, ?current, ?next, "ignoring backward transition");
            return false;
        }
        self.resolutions.insert(identifier, Resolution { state: next, details });
        true
    }

    fn schedule(&mut self, identifier: ObjectId) {
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&identifier) {
                return;
            }

            let provider = self.provider.clone();
            let completions = self.completions.clone();
            let generation = self.generation;
            let task = self.runtime.spawn(async move {
                let result = provider.fetch_detail(identifier).await;
                // The receiver is gone once the pipeline is dropped
                let _ = completions.send(Completion {
                    generation,
                    identifier,
                    result,
                });
            });
            in_flight.insert(identifier, task);
        }

        debug!(%identifier, generation = %self.generation, "scheduled detail fetch");
        self.transition(identifier, ResolutionState::Pending, None);
    }

    fn abort_in_flight(&self) {
        for (_, task) in self.in_flight.lock().drain() {
            task.abort();
        }
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        for index in 0..self.inner.count() {
            if let Ok(record) = self.inner.record_at(index) {
                self.positions.insert(record.identifier, index);
            }
        }
    }
}

impl<V: RecordView> RecordView for DeferredEnrichment<V> {
    fn count(&self) -> usize {
        self.inner.count()
    }

    fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        let mut record = self.inner.record_at(index)?;

        if self.state_of(record.identifier) == ResolutionState::Unresolved {
            self.schedule(record.identifier);
        }

        match self.resolutions.get(&record.identifier) {
            Some(resolution) if resolution.state == ResolutionState::Resolved => {
                record.state = ResolutionState::Resolved;
                record.details = resolution.details.clone();
            }
            Some(resolution) => {
                record.state = resolution.state;
                record.details = Some(RecordDetails::placeholder());
            }
            None => {
                record.details = Some(RecordDetails::placeholder());
            }
        }

        Ok(record)
    }

    fn generation(&self) -> Generation {
        self.inner.generation()
    }
}

impl<V: RecordView> SourceObserver for DeferredEnrichment<V> {
    fn on_source_event(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        if event == ViewEvent::StructuralChange {
            let generation = self.inner.generation();
            if generation != self.generation {
                let aborted = self.in_flight_count();
                self.abort_in_flight();
                self.resolutions.clear();
                self.generation = generation;
                info!(%generation, aborted, "record set replaced, enrichment reset");
            }
            self.rebuild_positions();
        }
        Some(event)
    }
}

impl<V> Drop for DeferredEnrichment<V> {
    fn drop(&mut self) {
        for (_, task) in self.in_flight.lock().drain() {
            task.abort();
        }
    }
}
