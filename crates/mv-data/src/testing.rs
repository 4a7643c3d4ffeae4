//! Test doubles shared by the layer tests

use std::sync::Arc;
use mv_core::{Generation, ObjectId, PipelineError, Record, RecordDetails, ResolutionState};

use crate::RecordView;

/// A record set whose states are set directly by the test
pub struct FixedView {
    records: Vec<Record>,
    generation: Generation,
}

impl FixedView {
    pub fn with_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut view = Self {
            records: Vec::new(),
            generation: Generation::default(),
        };
        view.replace(ids);
        view
    }

    /// Swap in a new record set under a new generation
    pub fn replace(&mut self, ids: impl IntoIterator<Item = u64>) {
        self.records = ids.into_iter().map(|id| Record::unresolved(ObjectId(id))).collect();
        self.generation = self.generation.next();
    }

    pub fn resolve(&mut self, index: usize, details: RecordDetails) {
        let record = &mut self.records[index];
        record.state = ResolutionState::Resolved;
        record.details = Some(Arc::new(details));
    }

    pub fn set_state(&mut self, index: usize, state: ResolutionState) {
        let record = &mut self.records[index];
        record.state = state;
        record.details = Some(RecordDetails::placeholder());
    }
}

impl RecordView for FixedView {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        self.records.get(index).cloned().ok_or(PipelineError::InvalidIndex {
            index,
            count: self.records.len(),
        })
    }

    fn generation(&self) -> Generation {
        self.generation
    }
}
