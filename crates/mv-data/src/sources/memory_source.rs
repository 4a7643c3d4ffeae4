//! In-memory catalog provider
//!
//! Serves a fixed catalog with optional simulated latency. Fetches can be held
//! pending and failures injected per identifier, which makes the background
//! behaviour of the pipeline reproducible.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use mv_core::{CatalogProvider, ObjectId, ProviderError, Query, RecordDetails, Year};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

/// Catalog provider backed by a map
pub struct MemorySource {
    name: String,
    catalog: RwLock<AHashMap<ObjectId, RecordDetails>>,
    /// Scripted results that take precedence over catalog matching
    searches: RwLock<AHashMap<Query, Vec<ObjectId>>>,
    failing_searches: RwLock<AHashSet<Query>>,
    failures: RwLock<AHashMap<ObjectId, ProviderError>>,
    gates: Mutex<AHashMap<ObjectId, Arc<Notify>>>,
    fetch_calls: Mutex<AHashMap<ObjectId, usize>>,
    completed_fetches: Mutex<AHashMap<ObjectId, usize>>,
    search_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog: RwLock::new(AHashMap::new()),
            searches: RwLock::new(AHashMap::new()),
            failing_searches: RwLock::new(AHashSet::new()),
            failures: RwLock::new(AHashMap::new()),
            gates: Mutex::new(AHashMap::new()),
            fetch_calls: Mutex::new(AHashMap::new()),
            completed_fetches: Mutex::new(AHashMap::new()),
            search_calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// A small synthetic catalog with per-fetch latency, for offline runs
    pub fn demo() -> Self {
        let titles = [
            ("Praying Hands", "Drawings", 1508),
            ("The Harvesters", "Paintings", 1565),
            ("Washington Crossing the Delaware", "Paintings", 1851),
            ("Wheat Field with Cypresses", "Paintings", 1889),
            ("Bashi Bazouk", "Paintings", 1868),
            ("Study of Hands", "Drawings", 1490),
            ("Armor of George Clifford", "Arms and Armor", 1586),
            ("Tsuba with Landscape", "Sword Furniture-Tsuba", 1750),
            ("Landscape with a Bridge", "Prints", 1640),
            ("Portrait of a Young Woman", "Paintings", 1665),
            ("Amphora", "Vases", -530),
            ("Hand Mirror", "Metalwork", 1400),
        ];

        let source = Self::new("demo").with_latency(Duration::from_millis(120));
        for (index, (title, classification, year)) in titles.iter().enumerate() {
            let mut details = RecordDetails::titled(*title);
            details.classification = Some(classification.to_string());
            details.begin = Some(Year(*year));
            details.end = Some(Year(*year));
            if index % 3 != 2 {
                details.thumbnail_url = Some(format!("https://images.example/{}.jpg", index + 1));
            }
            source.insert(ObjectId(index as u64 + 1), details);
        }
        source
    }

    /// Delay every detail fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builder-style insert
    pub fn with_record(self, identifier: u64, details: RecordDetails) -> Self {
        self.insert(ObjectId(identifier), details);
        self
    }

    /// Add or replace an object
    pub fn insert(&self, identifier: ObjectId, details: RecordDetails) {
        self.catalog.write().insert(identifier, details);
    }

    /// Make `query` return exactly `identifiers`
    pub fn script_search(&self, query: Query, identifiers: &[u64]) {
        let identifiers = identifiers.iter().copied().map(ObjectId).collect();
        self.searches.write().insert(query, identifiers);
    }

    /// Make searches for `query` fail
    pub fn fail_search(&self, query: Query) {
        self.failing_searches.write().insert(query);
    }

    /// Make detail fetches for `identifier` fail with `error`
    pub fn fail_detail(&self, identifier: u64, error: ProviderError) {
        self.failures.write().insert(ObjectId(identifier), error);
    }

    /// Stop injecting failures for `identifier`
    pub fn clear_failure(&self, identifier: u64) {
        self.failures.write().remove(&ObjectId(identifier));
    }

    /// Keep fetches for `identifier` pending until [`release`](Self::release)
    pub fn hold(&self, identifier: u64) {
        self.gates.lock().entry(ObjectId(identifier)).or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Let a held fetch finish
    pub fn release(&self, identifier: u64) {
        if let Some(gate) = self.gates.lock().remove(&ObjectId(identifier)) {
            gate.notify_one();
        }
    }

    /// Number of detail fetches started for `identifier`
    pub fn fetch_calls(&self, identifier: u64) -> usize {
        self.fetch_calls.lock().get(&ObjectId(identifier)).copied().unwrap_or(0)
    }

    /// Number of detail fetches for `identifier` that returned
    pub fn completed_fetches(&self, identifier: u64) -> usize {
        self.completed_fetches.lock().get(&ObjectId(identifier)).copied().unwrap_or(0)
    }

    /// Number of search or listing calls
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn matches(query: &Query, details: &RecordDetails) -> bool {
        let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(&needle.to_lowercase());

        query.text().map_or(true, |text| contains(&details.title, text))
            && query.classification().map_or(true, |c| {
                details.classification.as_deref().map_or(false, |value| contains(value, c))
            })
            && (!query.has_image() || details.has_image())
    }
}

#[async_trait]
impl CatalogProvider for MemorySource {
    async fn search(&self, query: &Query) -> Result<Vec<ObjectId>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_searches.read().contains(query) {
            return Err(ProviderError::Backend(format!("search for {} failed", query)));
        }
        if let Some(identifiers) = self.searches.read().get(query) {
            return Ok(identifiers.clone());
        }

        let catalog = self.catalog.read();
        let mut found: Vec<ObjectId> = catalog
            .iter()
            .filter(|(_, details)| Self::matches(query, details))
            .map(|(identifier, _)| *identifier)
            .collect();
        found.sort();
        Ok(found)
    }

    async fn fetch_detail(&self, identifier: ObjectId) -> Result<RecordDetails, ProviderError> {
        *self.fetch_calls.lock().entry(identifier).or_insert(0) += 1;

        let gate = self.gates.lock().get(&identifier).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        *self.completed_fetches.lock().entry(identifier).or_insert(0) += 1;

        if let Some(error) = self.failures.read().get(&identifier) {
            return Err(error.clone());
        }
        self.catalog
            .read()
            .get(&identifier)
            .cloned()
            .ok_or(ProviderError::NotFound(identifier))
    }

    async fn list_all_identifiers(&self) -> Result<Vec<ObjectId>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let mut identifiers: Vec<ObjectId> = self.catalog.read().keys().copied().collect();
        identifiers.sort();
        Ok(identifiers)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_matches_catalog() {
        let source = MemorySource::demo();

        let hands = source.search(&Query::new("hand")).await.unwrap();
        assert_eq!(hands, vec![ObjectId(1), ObjectId(6), ObjectId(12)]);

        let paintings = source
            .search(&Query::everything().with_classification("paintings"))
            .await
            .unwrap();
        assert_eq!(paintings.len(), 5);
    }

    #[tokio::test]
    async fn test_scripted_search_and_failures() {
        let source = MemorySource::new("test").with_record(1, RecordDetails::titled("One"));
        source.script_search(Query::new("x"), &[3, 1]);
        source.fail_search(Query::new("broken"));
        source.fail_detail(1, ProviderError::Backend("boom".to_string()));

        assert_eq!(source.search(&Query::new("x")).await.unwrap(), vec![ObjectId(3), ObjectId(1)]);
        assert!(source.search(&Query::new("broken")).await.is_err());
        assert!(source.fetch_detail(ObjectId(1)).await.is_err());
        assert_eq!(source.fetch_detail(ObjectId(9)).await, Err(ProviderError::NotFound(ObjectId(9))));

        source.clear_failure(1);
        assert_eq!(source.fetch_detail(ObjectId(1)).await.unwrap().title, "One");
        assert_eq!(source.fetch_calls(1), 2);
    }

    #[tokio::test]
    async fn test_held_fetch_waits_for_release() {
        let source = Arc::new(MemorySource::new("test").with_record(2, RecordDetails::titled("Two")));
        source.hold(2);

        let task = tokio::spawn({
            let source = source.clone();
            async move { source.fetch_detail(ObjectId(2)).await }
        });

        tokio::task::yield_now().await;
        assert_eq!(source.fetch_calls(2), 1);
        assert_eq!(source.completed_fetches(2), 0);

        source.release(2);
        let details = task.await.unwrap().unwrap();
        assert_eq!(details.title, "Two");
        assert_eq!(source.completed_fetches(2), 1);
    }
}
