//! Normalized search parameters

use std::fmt;
use serde::{Serialize, Deserialize};

/// Classification names offered for auto-completion
pub const KNOWN_CLASSIFICATIONS: &[&str] = &[
    "Albums",
    "Archery Equipment-Bows",
    "Books",
    "Ceramics-Porcelain",
    "Codices",
    "Drawings",
    "Ephemera",
    "Glass",
    "Glass-Painted",
    "Jewelry",
    "Musical instruments",
    "Ornament & Architecture",
    "Paintings",
    "Paper",
    "Periodicals",
    "Photographs",
    "Portfolios",
    "Posters",
    "Printed matter",
    "Prints",
    "Sculpture",
    "Sword Furniture-Tsuba",
    "Textiles-Embroidered",
    "Tools",
];

/// Search parameters. Two queries are equal iff every normalized field matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    text: Option<String>,
    classification: Option<String>,
    has_image: bool,
}

impl Query {
    /// Create a free-text query
    pub fn new(text: impl AsRef<str>) -> Self {
        Self {
            text: normalize(text.as_ref()),
            ..Self::default()
        }
    }

    /// The query that lists the whole catalog
    pub fn everything() -> Self {
        Self::default()
    }

    /// Restrict results to a classification
    pub fn with_classification(mut self, classification: impl AsRef<str>) -> Self {
        self.classification = normalize(classification.as_ref());
        self
    }

    /// Only return objects that have images
    pub fn with_images_only(mut self, has_image: bool) -> Self {
        self.has_image = has_image;
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn classification(&self) -> Option<&str> {
        self.classification.as_deref()
    }

    pub fn has_image(&self) -> bool {
        self.has_image
    }

    /// Whether no parameter is set, so a bulk listing can stand in for a search
    pub fn is_listing(&self) -> bool {
        self.text.is_none() && self.classification.is_none() && !self.has_image
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.text.as_deref().unwrap_or(""))?;
        if let Some(classification) = &self.classification {
            write!(f, " classification={}", classification)?;
        }
        if self.has_image {
            write!(f, " has_image")?;
        }
        Ok(())
    }
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Epoch of the record set. Advances every time the store's identifiers are replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_queries_are_equal() {
        let a = Query::new("  Hand ").with_classification("Paintings ");
        let b = Query::new("Hand").with_classification("Paintings");
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_images_only(true));
    }

    #[test]
    fn test_blank_query_is_listing() {
        assert!(Query::new("   ").is_listing());
        assert!(Query::everything().with_classification("").is_listing());
        assert!(!Query::everything().with_images_only(true).is_listing());
        assert!(!Query::new("x").is_listing());
    }

    #[test]
    fn test_query_serializes() {
        let query = Query::new("Hand").with_images_only(true);
        let json = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(query, back);
    }
}
