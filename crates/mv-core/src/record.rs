//! Catalog records and their resolution lifecycle

use std::fmt;
use std::sync::Arc;
use once_cell::sync::Lazy;
use serde::{Serialize, Deserialize};

/// Title shown while a record's details are not available
pub const PLACEHOLDER_TITLE: &str = "Loading...";

/// Title used when the provider omits one
pub const TITLE_NOT_FOUND: &str = "<No title>";

/// Artist used when the provider omits one
pub const ARTIST_NOT_FOUND: &str = "<No artist name>";

static PLACEHOLDER: Lazy<Arc<RecordDetails>> = Lazy::new(|| {
    Arc::new(RecordDetails {
        artist: String::new(),
        classification: None,
        begin: None,
        end: None,
        medium: None,
        thumbnail_url: None,
        title: PLACEHOLDER_TITLE.to_string(),
    })
});

/// Identifier of an object in the remote catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        ObjectId(value)
    }
}

/// A calendar year. Negative values are B.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Year(pub i32);

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detail fields of a catalog object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetails {
    /// The name, group, or entity that created the object
    pub artist: String,

    /// The type of object
    pub classification: Option<String>,

    /// First year associated with the object
    pub begin: Option<Year>,

    /// Last year associated with the object
    pub end: Option<Year>,

    /// Material or method used to create the object
    pub medium: Option<String>,

    /// Small image URL, if any
    pub thumbnail_url: Option<String>,

    /// Display title
    pub title: String,
}

impl RecordDetails {
    /// Shared stand-in fields shown until real details arrive
    pub fn placeholder() -> Arc<RecordDetails> {
        PLACEHOLDER.clone()
    }

    /// Create details with only a title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            artist: ARTIST_NOT_FOUND.to_string(),
            classification: None,
            begin: None,
            end: None,
            medium: None,
            thumbnail_url: None,
            title: title.into(),
        }
    }

    /// Whether the provider knows an image for this object
    pub fn has_image(&self) -> bool {
        self.thumbnail_url.is_some()
    }

    /// The (begin, end) year range
    pub fn date_range(&self) -> (Option<Year>, Option<Year>) {
        (self.begin, self.end)
    }

    /// Multi-line summary used for hover text
    pub fn tooltip(&self, identifier: ObjectId) -> String {
        fn or_missing<'a>(value: Option<&'a str>, missing: &'a str) -> &'a str {
            value.filter(|v| !v.is_empty()).unwrap_or(missing)
        }

        let date = match (self.begin, self.end) {
            (Some(begin), Some(end)) if begin == end => begin.to_string(),
            (Some(begin), Some(end)) => format!("{} - {}", begin, end),
            (Some(year), None) | (None, Some(year)) => year.to_string(),
            (None, None) => "<No date found>".to_string(),
        };

        format!(
            "Title: {}\nArtist: {}\nDate: {}\nClassification: {}\nHas Thumbnail: {}\nID: {}",
            or_missing(Some(&self.title), "<No title found>"),
            or_missing(Some(&self.artist), "<No artist name found>"),
            date,
            or_missing(self.classification.as_deref(), "<No classification found>"),
            self.has_image(),
            identifier,
        )
    }
}

/// Per-record lifecycle tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionState {
    /// No fetch has been scheduled yet
    Unresolved,
    /// A background fetch is in flight
    Pending,
    /// Details are available
    Resolved,
    /// The fetch failed; placeholder fields are kept
    Failed,
}

impl ResolutionState {
    /// Whether moving to `next` is a forward transition.
    ///
    /// `Failed -> Unresolved` is not forward; only an explicit retry performs it.
    pub fn can_advance_to(self, next: ResolutionState) -> bool {
        matches!(
            (self, next),
            (ResolutionState::Unresolved, ResolutionState::Pending)
                | (ResolutionState::Pending, ResolutionState::Resolved)
                | (ResolutionState::Pending, ResolutionState::Failed)
        )
    }
}

/// A snapshot of one record as seen by a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub identifier: ObjectId,
    pub state: ResolutionState,
    /// `None` until a layer attaches real or placeholder fields
    pub details: Option<Arc<RecordDetails>>,
}

impl Record {
    /// Create a bare record with no detail fields
    pub fn unresolved(identifier: ObjectId) -> Self {
        Self {
            identifier,
            state: ResolutionState::Unresolved,
            details: None,
        }
    }

    /// Whether real details are attached
    pub fn is_resolved(&self) -> bool {
        self.state == ResolutionState::Resolved
    }

    /// Title to display (placeholder title when nothing is attached)
    pub fn title(&self) -> &str {
        self.details
            .as_deref()
            .map(|d| d.title.as_str())
            .unwrap_or(PLACEHOLDER_TITLE)
    }

    /// Resolved details, if any. Placeholder fields are not returned.
    pub fn resolved_details(&self) -> Option<&RecordDetails> {
        if self.is_resolved() {
            self.details.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        use ResolutionState::*;

        assert!(Unresolved.can_advance_to(Pending));
        assert!(Pending.can_advance_to(Resolved));
        assert!(Pending.can_advance_to(Failed));

        assert!(!Failed.can_advance_to(Unresolved));
        assert!(!Resolved.can_advance_to(Pending));
        assert!(!Unresolved.can_advance_to(Resolved));
        assert!(!Pending.can_advance_to(Pending));
    }

    #[test]
    fn test_placeholder_is_shared() {
        let a = RecordDetails::placeholder();
        let b = RecordDetails::placeholder();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.title, PLACEHOLDER_TITLE);
        assert!(!a.has_image());
    }

    #[test]
    fn test_unresolved_record_has_placeholder_title() {
        let record = Record::unresolved(ObjectId(7));
        assert_eq!(record.title(), PLACEHOLDER_TITLE);
        assert!(record.resolved_details().is_none());
    }

    #[test]
    fn test_tooltip_formats_bc_range() {
        let mut details = RecordDetails::titled("Amphora");
        details.begin = Some(Year(-530));
        details.end = Some(Year(-520));
        details.classification = Some("Vases".to_string());

        let tooltip = details.tooltip(ObjectId(42));
        assert!(tooltip.contains("Title: Amphora"));
        assert!(tooltip.contains("Date: -530 - -520"));
        assert!(tooltip.contains("Classification: Vases"));
        assert!(tooltip.contains("Has Thumbnail: false"));
        assert!(tooltip.ends_with("ID: 42"));
    }
}
