//! Sorting and filtering of enriched records
//!
//! Records without real details cannot be compared or tested, so they are
//! ordered after every resolved record and always pass the filter. When a
//! single record resolves it is re-positioned locally instead of re-sorting
//! the whole view.

use std::cmp::Ordering;
use mv_core::{PipelineError, Record, RecordDetails, Generation, ViewEvent};
use tracing::{debug, warn};

use crate::{RecordView, SourceObserver};

/// Field used to order resolved records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Title,
    Artist,
    Classification,
    Medium,
    /// Begin year, falling back to the end year
    Date,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Sort configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            order: SortOrder::Descending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Year(i32),
}

impl SortKey {
    fn value_of(self, details: &RecordDetails) -> Option<SortValue> {
        fn text(value: &str) -> Option<SortValue> {
            let value = value.trim();
            (!value.is_empty()).then(|| SortValue::Text(value.to_lowercase()))
        }

        match self {
            SortKey::Title => text(&details.title),
            SortKey::Artist => text(&details.artist),
            SortKey::Classification => details.classification.as_deref().and_then(text),
            SortKey::Medium => details.medium.as_deref().and_then(text),
            SortKey::Date => details.begin.or(details.end).map(|year| SortValue::Year(year.0)),
        }
    }
}

/// Where a record falls in the ordering
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rank {
    /// Resolved, with a value for the sort key
    Value(SortValue),
    /// Resolved, but the sort key is empty
    Missing,
    /// Not resolved: compares greater than any resolved record
    Unsettled,
}

impl Rank {
    fn tier(&self) -> u8 {
        match self {
            Rank::Value(_) => 0,
            Rank::Missing => 1,
            Rank::Unsettled => 2,
        }
    }
}

/// A filter predicate over resolved details
pub trait RecordPredicate: Send {
    fn accepts(&self, details: &RecordDetails) -> bool;
}

impl<F> RecordPredicate for F
where
    F: Fn(&RecordDetails) -> bool + Send,
{
    fn accepts(&self, details: &RecordDetails) -> bool {
        self(details)
    }
}

/// Case-insensitive substring filter on the common search fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    title_contains: Option<String>,
    classification_contains: Option<String>,
    require_image: bool,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title_contains(mut self, needle: impl AsRef<str>) -> Self {
        self.title_contains = lowered(needle.as_ref());
        self
    }

    pub fn classification_contains(mut self, needle: impl AsRef<str>) -> Self {
        self.classification_contains = lowered(needle.as_ref());
        self
    }

    pub fn require_image(mut self, require: bool) -> Self {
        self.require_image = require;
        self
    }

    /// Whether the filter accepts everything
    pub fn is_empty(&self) -> bool {
        self.title_contains.is_none() && self.classification_contains.is_none() && !self.require_image
    }
}

fn lowered(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_lowercase())
}

impl RecordPredicate for RecordFilter {
    fn accepts(&self, details: &RecordDetails) -> bool {
        let title_ok = self
            .title_contains
            .as_deref()
            .map_or(true, |needle| details.title.to_lowercase().contains(needle));
        let classification_ok = self.classification_contains.as_deref().map_or(true, |needle| {
            details
                .classification
                .as_deref()
                .map_or(false, |value| value.to_lowercase().contains(needle))
        });

        title_ok && classification_ok && (!self.require_image || details.has_image())
    }
}

#[derive(Debug, Clone)]
struct RowState {
    rank: Rank,
    included: bool,
}

/// Sorted, filtered view over the layer below
pub struct OrderingFilter<V> {
    inner: V,
    sort: Option<SortSpec>,
    filter: Option<Box<dyn RecordPredicate>>,
    /// Indexed by source position
    states: Vec<RowState>,
    /// Visible order, as source positions
    rows: Vec<usize>,
}

impl<V: RecordView> OrderingFilter<V> {
    /// Wrap `inner` with no sort and no filter
    pub fn new(inner: V) -> Self {
        let mut layer = Self {
            inner,
            sort: None,
            filter: None,
            states: Vec::new(),
            rows: Vec::new(),
        };
        layer.reevaluate();
        layer
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut V {
        &mut self.inner
    }

    /// Replace the sort and filter, then rebuild the whole view
    pub fn configure(&mut self, sort: Option<SortSpec>, filter: Option<Box<dyn RecordPredicate>>) -> ViewEvent {
        self.sort = sort;
        self.filter = filter;
        self.reevaluate();
        debug!(?sort, visible = self.rows.len(), "ordering reconfigured");
        ViewEvent::StructuralChange
    }

    /// Position in the layer below of the record shown at `visible`
    pub fn source_index(&self, visible: usize) -> mv_core::Result<usize> {
        self.rows.get(visible).copied().ok_or(PipelineError::InvalidIndex {
            index: visible,
            count: self.rows.len(),
        })
    }

    fn evaluate(&mut self, source: usize) -> RowState {
        let record = match self.inner.record_at(source) {
            Ok(record) => record,
            Err(e) => {
                warn!(source, error = %e, "could not read record for ordering");
                return RowState {
                    rank: Rank::Unsettled,
                    included: false,
                };
            }
        };

        match record.resolved_details() {
            Some(details) => RowState {
                rank: match self.sort {
                    Some(spec) => spec.key.value_of(details).map_or(Rank::Missing, Rank::Value),
                    None => Rank::Missing,
                },
                included: self.filter.as_ref().map_or(true, |f| f.accepts(details)),
            },
            None => RowState {
                rank: Rank::Unsettled,
                included: true,
            },
        }
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        let Some(spec) = self.sort else {
            return a.cmp(&b);
        };

        let by_rank = match (&self.states[a].rank, &self.states[b].rank) {
            (Rank::Value(x), Rank::Value(y)) => match spec.order {
                SortOrder::Ascending => x.cmp(y),
                SortOrder::Descending => y.cmp(x),
            },
            (x, y) => x.tier().cmp(&y.tier()),
        };

        by_rank.then(a.cmp(&b))
    }

    fn reevaluate(&mut self) {
        let count = self.inner.count();
        let states: Vec<RowState> = (0..count).map(|source| self.evaluate(source)).collect();
        self.states = states;

        let mut rows: Vec<usize> = (0..count).filter(|source| self.states[*source].included).collect();
        rows.sort_by(|a, b| self.compare(*a, *b));
        self.rows = rows;
    }

    /// Re-position one record after its fields or state changed
    fn reposition(&mut self, source: usize) -> Option<ViewEvent> {
        if source >= self.states.len() {
            return None;
        }

        let before = self.rows.iter().position(|row| *row == source);
        if let Some(position) = before {
            self.rows.remove(position);
        }

        self.states[source] = self.evaluate(source);

        let after = if self.states[source].included {
            let position = self
                .rows
                .partition_point(|row| self.compare(*row, source) == Ordering::Less);
            self.rows.insert(position, source);
            Some(position)
        } else {
            None
        };

        match (before, after) {
            (Some(b), Some(a)) if a == b => Some(ViewEvent::RecordChanged(a)),
            (None, None) => None,
            _ => Some(ViewEvent::StructuralChange),
        }
    }
}

impl<V: RecordView> RecordView for OrderingFilter<V> {
    fn count(&self) -> usize {
        self.rows.len()
    }

    fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        let source = self.source_index(index)?;
        self.inner.record_at(source)
    }

    fn generation(&self) -> Generation {
        self.inner.generation()
    }
}

impl<V: RecordView> SourceObserver for OrderingFilter<V> {
    fn on_source_event(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        match event {
            ViewEvent::StructuralChange => {
                self.reevaluate();
                Some(ViewEvent::StructuralChange)
            }
            ViewEvent::RecordChanged(source) => self.reposition(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedView;
    use mv_core::{ObjectId, ResolutionState, Year};

    fn identifiers<V: RecordView>(view: &mut V) -> Vec<u64> {
        (0..view.count()).map(|i| view.record_at(i).unwrap().identifier.0).collect()
    }

    fn painting(title: &str, year: i32) -> RecordDetails {
        let mut details = RecordDetails::titled(title);
        details.classification = Some("Paintings".to_string());
        details.begin = Some(Year(year));
        details
    }

    #[test]
    fn test_default_keeps_source_order() {
        let mut view = FixedView::with_ids([5, 3, 9]);
        view.resolve(1, painting("Zebra", 1900));
        let mut ordering = OrderingFilter::new(view);

        assert_eq!(identifiers(&mut ordering), vec![5, 3, 9]);
        assert_eq!(ordering.source_index(2), Ok(2));
    }

    #[test]
    fn test_all_unresolved_keeps_source_order() {
        let mut ordering = OrderingFilter::new(FixedView::with_ids([1, 2, 3]));
        ordering.configure(Some(SortSpec::ascending(SortKey::Title)), None);

        assert_eq!(identifiers(&mut ordering), vec![1, 2, 3]);
    }

    #[test]
    fn test_unresolved_sort_after_resolved_in_both_directions() {
        let mut view = FixedView::with_ids([1, 2, 3, 4]);
        view.resolve(1, painting("Bridge", 1640));
        view.resolve(3, painting("Amphora", -530));
        view.set_state(2, ResolutionState::Failed);
        let mut ordering = OrderingFilter::new(view);

        ordering.configure(Some(SortSpec::ascending(SortKey::Title)), None);
        assert_eq!(identifiers(&mut ordering), vec![4, 2, 1, 3]);

        ordering.configure(Some(SortSpec::descending(SortKey::Title)), None);
        assert_eq!(identifiers(&mut ordering), vec![2, 4, 1, 3]);

        ordering.configure(Some(SortSpec::ascending(SortKey::Date)), None);
        assert_eq!(identifiers(&mut ordering), vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_missing_key_sorts_after_present_key() {
        let mut view = FixedView::with_ids([1, 2, 3]);
        view.resolve(0, RecordDetails::titled("No medium"));
        let mut with_medium = painting("Oil", 1800);
        with_medium.medium = Some("Oil on canvas".to_string());
        view.resolve(1, with_medium);
        let mut ordering = OrderingFilter::new(view);

        ordering.configure(Some(SortSpec::ascending(SortKey::Medium)), None);
        assert_eq!(identifiers(&mut ordering), vec![2, 1, 3]);
    }

    #[test]
    fn test_equal_keys_keep_source_order() {
        let mut view = FixedView::with_ids([7, 8, 9]);
        view.resolve(0, painting("Same", 1));
        view.resolve(1, painting("Other", 1));
        view.resolve(2, painting("same", 1));
        let mut ordering = OrderingFilter::new(view);

        ordering.configure(Some(SortSpec::ascending(SortKey::Title)), None);
        assert_eq!(identifiers(&mut ordering), vec![8, 7, 9]);
    }

    #[test]
    fn test_filter_includes_unresolved_optimistically() {
        let mut view = FixedView::with_ids([1, 2, 3]);
        view.resolve(0, painting("Praying Hands", 1508));
        view.resolve(1, RecordDetails::titled("Amphora"));
        let mut ordering = OrderingFilter::new(view);

        let filter = RecordFilter::new().classification_contains("paint");
        ordering.configure(None, Some(Box::new(filter)));
        assert_eq!(identifiers(&mut ordering), vec![1, 3]);
    }

    #[test]
    fn test_resolution_hides_non_matching_record() {
        let mut ordering = OrderingFilter::new(FixedView::with_ids([1, 2]));
        ordering.configure(None, Some(Box::new(|d: &RecordDetails| d.has_image())));
        assert_eq!(ordering.count(), 2);

        ordering.inner_mut().resolve(1, RecordDetails::titled("No image"));
        assert_eq!(
            ordering.on_source_event(ViewEvent::RecordChanged(1)),
            Some(ViewEvent::StructuralChange)
        );
        assert_eq!(identifiers(&mut ordering), vec![1]);

        // Hidden and still hidden: nothing to report
        assert_eq!(ordering.on_source_event(ViewEvent::RecordChanged(1)), None);
    }

    #[test]
    fn test_resolution_reinserts_locally() {
        let mut view = FixedView::with_ids([1, 2, 3]);
        view.resolve(0, painting("Middle", 1700));
        let mut ordering = OrderingFilter::new(view);
        ordering.configure(Some(SortSpec::ascending(SortKey::Title)), None);
        assert_eq!(identifiers(&mut ordering), vec![1, 2, 3]);

        // Sorts before "Middle": the record moves
        ordering.inner_mut().resolve(2, painting("Amphora", -530));
        assert_eq!(
            ordering.on_source_event(ViewEvent::RecordChanged(2)),
            Some(ViewEvent::StructuralChange)
        );
        assert_eq!(identifiers(&mut ordering), vec![3, 1, 2]);

        // Sorts after "Middle" and ahead of nothing unresolved: position holds
        ordering.inner_mut().resolve(1, painting("Zebra", 1900));
        assert_eq!(
            ordering.on_source_event(ViewEvent::RecordChanged(1)),
            Some(ViewEvent::RecordChanged(2))
        );
        assert_eq!(identifiers(&mut ordering), vec![3, 1, 2]);
        assert_eq!(ordering.record_at(2).unwrap().identifier, ObjectId(2));
    }

    #[test]
    fn test_structural_change_rebuilds_view() {
        let mut ordering = OrderingFilter::new(FixedView::with_ids([1, 2, 3]));
        ordering.inner_mut().replace([4]);

        assert_eq!(
            ordering.on_source_event(ViewEvent::StructuralChange),
            Some(ViewEvent::StructuralChange)
        );
        assert_eq!(identifiers(&mut ordering), vec![4]);
        assert!(ordering.source_index(1).is_err());
    }

    #[test]
    fn test_record_filter_fields() {
        let mut details = painting("Wheat Field with Cypresses", 1889);
        details.thumbnail_url = Some("https://images.example/1.jpg".to_string());

        assert!(RecordFilter::new().is_empty());
        assert!(RecordFilter::new().title_contains("wheat").accepts(&details));
        assert!(!RecordFilter::new().title_contains("hands").accepts(&details));
        assert!(RecordFilter::new().classification_contains("PAINT").require_image(true).accepts(&details));

        details.thumbnail_url = None;
        assert!(!RecordFilter::new().require_image(true).accepts(&details));
    }
}
