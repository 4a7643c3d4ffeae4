//! Window limiter: exposes at most K records of the layer below

use std::cmp::min;
use mv_core::{Generation, PipelineError, Record, ViewEvent};
use tracing::debug;

use crate::{RecordView, SourceObserver};

/// Caps the number of exposed records at `capacity`
pub struct WindowLimiter<V> {
    inner: V,
    capacity: usize,
    exposed: usize,
    generation: Generation,
}

impl<V: RecordView> WindowLimiter<V> {
    pub fn new(inner: V, capacity: usize) -> Self {
        let exposed = min(inner.count(), capacity);
        let generation = inner.generation();
        Self {
            inner,
            capacity,
            exposed,
            generation,
        }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut V {
        &mut self.inner
    }
}

impl<V: RecordView> RecordView for WindowLimiter<V> {
    fn count(&self) -> usize {
        min(self.inner.count(), self.capacity)
    }

    fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        let count = self.count();
        if index >= count {
            return Err(PipelineError::InvalidIndex { index, count });
        }
        self.inner.record_at(index)
    }

    fn generation(&self) -> Generation {
        self.inner.generation()
    }
}

/// The window filters structural events only; record changes pass through.
impl<V: RecordView> SourceObserver for WindowLimiter<V> {
    fn on_source_event(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        match event {
            ViewEvent::StructuralChange => {
                let exposed = self.count();
                let generation = self.inner.generation();
                if exposed == self.exposed && generation == self.generation {
                    return None;
                }

                debug!(exposed, total = self.inner.count(), %generation, "window reset");
                self.exposed = exposed;
                self.generation = generation;
                Some(ViewEvent::StructuralChange)
            }
            // Only exposed rows are ever read, so changes always fall inside
            ViewEvent::RecordChanged(_) => Some(event),
        }
    }
}
