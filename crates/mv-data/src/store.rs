//! Record store: the authoritative identifier list for the query in effect

use std::sync::Arc;
use ahash::AHashSet;
use mv_core::{CatalogProvider, Generation, ObjectId, PipelineError, ProviderError, Query, Record, ViewEvent};
use tracing::info;

use crate::cache::QueryCache;
use crate::RecordView;

/// Runs listing queries, consulting the shared cache before the provider.
///
/// Cheap to clone so searches can run on a background task.
#[derive(Clone)]
pub struct QueryRunner {
    provider: Arc<dyn CatalogProvider>,
    cache: Arc<QueryCache>,
}

impl QueryRunner {
    pub fn new(provider: Arc<dyn CatalogProvider>, cache: Arc<QueryCache>) -> Self {
        Self { provider, cache }
    }

    pub fn provider(&self) -> &Arc<dyn CatalogProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Resolve `query` to identifiers in provider relevance order.
    ///
    /// Only successful results are cached.
    pub async fn fetch(&self, query: &Query) -> Result<Arc<[ObjectId]>, ProviderError> {
        if let Some(identifiers) = self.cache.get(query) {
            info!(%query, count = identifiers.len(), "query served from cache");
            return Ok(identifiers);
        }

        let found = if query.is_listing() {
            self.provider.list_all_identifiers().await?
        } else {
            self.provider.search(query).await?
        };

        let identifiers: Arc<[ObjectId]> = dedup_preserving_order(found).into();
        info!(
            %query,
            provider = self.provider.provider_name(),
            count = identifiers.len(),
            "query fetched"
        );
        self.cache.put(query.clone(), identifiers.clone());

        Ok(identifiers)
    }
}

/// Keep the first occurrence of each identifier
fn dedup_preserving_order(mut identifiers: Vec<ObjectId>) -> Vec<ObjectId> {
    let mut seen = AHashSet::with_capacity(identifiers.len());
    identifiers.retain(|identifier| seen.insert(*identifier));
    identifiers
}

/// Owns the identifiers of the current query. The only layer that creates records.
pub struct RecordStore {
    runner: QueryRunner,
    query: Option<Query>,
    identifiers: Arc<[ObjectId]>,
    generation: Generation,
}

impl RecordStore {
    /// Create an empty store
    pub fn new(runner: QueryRunner) -> Self {
        Self {
            runner,
            query: None,
            identifiers: Arc::from(Vec::new()),
            generation: Generation::default(),
        }
    }

    pub fn runner(&self) -> &QueryRunner {
        &self.runner
    }

    /// The query currently in effect
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    pub fn identifiers(&self) -> &[ObjectId] {
        &self.identifiers
    }

    /// Fetch `query` and replace the store's content with the result.
    ///
    /// On failure the store and the cache are left untouched.
    pub async fn run_query(&mut self, query: Query) -> Result<(Arc<[ObjectId]>, Option<ViewEvent>), PipelineError> {
        let identifiers = self.runner.fetch(&query).await?;
        let event = self.replace(query, identifiers.clone());
        Ok((identifiers, event))
    }

    /// Install a query result, discarding every prior record.
    ///
    /// Re-installing the result already in effect is a no-op and emits nothing.
    pub fn replace(&mut self, query: Query, identifiers: Arc<[ObjectId]>) -> Option<ViewEvent> {
        if self.query.as_ref() == Some(&query) && *self.identifiers == *identifiers {
            return None;
        }

        self.generation = self.generation.next();
        self.query = Some(query);
        self.identifiers = identifiers;

        Some(ViewEvent::StructuralChange)
    }
}

impl RecordView for RecordStore {
    fn count(&self) -> usize {
        self.identifiers.len()
    }

    fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        self.identifiers
            .get(index)
            .map(|identifier| Record::unresolved(*identifier))
            .ok_or(PipelineError::InvalidIndex {
                index,
                count: self.identifiers.len(),
            })
    }

    fn generation(&self) -> Generation {
        self.generation
    }
}
