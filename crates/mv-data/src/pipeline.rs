//! The composed pipeline
//!
//! [`Pipeline`] owns every layer and is the only thing that mutates them.
//! Background work (detail fetches and submitted searches) reports back over
//! channels; the owner applies results with [`Pipeline::poll_completions`] or
//! [`Pipeline::next_completion`], so layer state is only ever touched from one
//! place and observers see events in the order the layers produced them.

use std::sync::Arc;
use mv_core::{
    CatalogProvider, Notifier, ObjectId, PipelineError, PipelineObserver, ProviderError, Query, Record,
    Subscription, ViewEvent,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, QueryCache};
use crate::config::PipelineConfig;
use crate::enrichment::{Completion, DeferredEnrichment};
use crate::ordering::{OrderingFilter, RecordPredicate, SortSpec};
use crate::store::{QueryRunner, RecordStore};
use crate::window::WindowLimiter;
use crate::{RecordView, SourceObserver};

type Enrichment = DeferredEnrichment<WindowLimiter<RecordStore>>;

/// Counters describing how far loading has progressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatistics {
    /// Identifiers returned by the current query
    pub total: usize,
    /// Records inside the window
    pub exposed: usize,
    /// Records passing the filter
    pub visible: usize,
    pub pending: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Background results dropped because their query was replaced
    pub stale_completions: u64,
    pub cache: CacheStats,
}

struct SearchOutcome {
    ticket: u64,
    query: Query,
    result: Result<Arc<[ObjectId]>, ProviderError>,
}

struct ActiveSearch {
    ticket: u64,
    task: JoinHandle<()>,
}

enum Incoming {
    Search(SearchOutcome),
    Detail(Completion),
}

/// Store, window, enrichment and ordering, behind one consumer-facing API
pub struct Pipeline {
    view: OrderingFilter<Enrichment>,
    runner: QueryRunner,
    notifier: Notifier,
    runtime: Handle,
    completions: UnboundedReceiver<Completion>,
    search_results: UnboundedReceiver<SearchOutcome>,
    search_sender: UnboundedSender<SearchOutcome>,
    active_search: Option<ActiveSearch>,
    next_ticket: u64,
}

impl Pipeline {
    /// Build an empty pipeline. Background work runs on `runtime`.
    pub fn new(provider: Arc<dyn CatalogProvider>, config: &PipelineConfig, runtime: Handle) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache_capacity).with_max_result_len(config.max_cached_result_len));
        let runner = QueryRunner::new(provider.clone(), cache);
        let (completion_sender, completions) = mpsc::unbounded_channel();
        let (search_sender, search_results) = mpsc::unbounded_channel();

        let store = RecordStore::new(runner.clone());
        let window = WindowLimiter::new(store, config.window_capacity);
        let enrichment = DeferredEnrichment::new(window, provider, runtime.clone(), completion_sender);
        let view = OrderingFilter::new(enrichment);

        info!(
            provider = runner.provider().provider_name(),
            window = config.window_capacity,
            cache = config.cache_capacity,
            "pipeline created"
        );

        Self {
            view,
            runner,
            notifier: Notifier::new(),
            runtime,
            completions,
            search_results,
            search_sender,
            active_search: None,
            next_ticket: 0,
        }
    }

    /// Number of records visible to the consumer
    pub fn count(&self) -> usize {
        self.view.count()
    }

    /// Read a visible record. Never blocks; may schedule a background fetch.
    pub fn record_at(&mut self, index: usize) -> mv_core::Result<Record> {
        self.view.record_at(index)
    }

    /// Position in the query result of the record shown at `visible`
    pub fn source_index(&self, visible: usize) -> mv_core::Result<usize> {
        self.view.source_index(visible)
    }

    pub fn subscribe(&self, observer: Arc<dyn PipelineObserver>) -> Subscription {
        self.notifier.subscribe(observer)
    }

    /// The query in effect, if one has run
    pub fn current_query(&self) -> Option<&Query> {
        self.store().query()
    }

    /// Set the sort and filter. Observers see one structural change.
    pub fn configure(&mut self, sort: Option<SortSpec>, filter: Option<Box<dyn RecordPredicate>>) {
        let event = self.view.configure(sort, filter);
        self.notifier.publish(event);
    }

    /// Re-enable fetching for a failed record. Returns false if it had not failed.
    ///
    /// The ordering layer re-reads the changed record, so the new fetch is
    /// scheduled before this returns.
    pub fn retry(&mut self, identifier: ObjectId) -> bool {
        match self.view.inner_mut().retry(identifier) {
            Some(event) => {
                if let Some(event) = self.view.on_source_event(event) {
                    self.notifier.publish(event);
                }
                true
            }
            None => false,
        }
    }

    /// Run `query` and install its result, superseding any submitted search.
    ///
    /// On provider failure the current content and the cache are left as they were.
    pub async fn run_query(&mut self, query: Query) -> mv_core::Result<Arc<[ObjectId]>> {
        self.cancel_search();

        let identifiers = self.runner.fetch(&query).await?;
        self.install(query, identifiers.clone());
        Ok(identifiers)
    }

    /// Start `query` in the background. A later submission or [`run_query`](Self::run_query)
    /// supersedes it; its result is then discarded. Returns the search ticket.
    pub fn submit_query(&mut self, query: Query) -> u64 {
        self.cancel_search();

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let runner = self.runner.clone();
        let sender = self.search_sender.clone();
        debug!(ticket, %query, "submitting search");
        let task = self.runtime.spawn(async move {
            let result = runner.fetch(&query).await;
            let _ = sender.send(SearchOutcome { ticket, query, result });
        });

        self.active_search = Some(ActiveSearch { ticket, task });
        ticket
    }

    /// Whether a search or a detail fetch is still outstanding
    pub fn has_pending_work(&self) -> bool {
        self.active_search.is_some() || self.view.inner().in_flight_count() > 0
    }

    /// Apply every background result that has arrived, without waiting.
    ///
    /// Returns how many results were applied. A failed submitted search is
    /// reported after the remaining results are drained.
    pub fn poll_completions(&mut self) -> mv_core::Result<usize> {
        let mut applied = 0;
        let mut search_error = None;

        while let Ok(outcome) = self.search_results.try_recv() {
            match self.apply_search(outcome) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => search_error = Some(e),
            }
        }
        while let Ok(completion) = self.completions.try_recv() {
            if self.apply_completion(completion) {
                applied += 1;
            }
        }

        match search_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    /// Wait for the next background result and apply it.
    ///
    /// Returns whether it changed anything; stale results return `false`.
    /// Only call this while [`has_pending_work`](Self::has_pending_work) is true.
    pub async fn next_completion(&mut self) -> mv_core::Result<bool> {
        let incoming = tokio::select! {
            outcome = self.search_results.recv() => outcome.map(Incoming::Search),
            completion = self.completions.recv() => completion.map(Incoming::Detail),
        };

        match incoming {
            Some(Incoming::Search(outcome)) => self.apply_search(outcome),
            Some(Incoming::Detail(completion)) => Ok(self.apply_completion(completion)),
            None => Ok(false),
        }
    }

    /// Apply results until nothing is outstanding
    pub async fn settle(&mut self) -> mv_core::Result<()> {
        while self.has_pending_work() {
            self.next_completion().await?;
        }
        Ok(())
    }

    pub fn statistics(&self) -> LoadStatistics {
        let enrichment = self.view.inner();
        let counts = enrichment.counts();

        LoadStatistics {
            total: self.store().count(),
            exposed: enrichment.count(),
            visible: self.view.count(),
            pending: counts.pending,
            resolved: counts.resolved,
            failed: counts.failed,
            stale_completions: enrichment.stale_completions(),
            cache: self.cache_stats(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.runner.cache().stats()
    }

    fn store(&self) -> &RecordStore {
        self.view.inner().inner().inner()
    }

    fn cancel_search(&mut self) {
        if let Some(search) = self.active_search.take() {
            debug!(ticket = search.ticket, "search superseded");
            search.task.abort();
        }
    }

    fn install(&mut self, query: Query, identifiers: Arc<[ObjectId]>) {
        info!(%query, count = identifiers.len(), "installing query result");
        if let Some(event) = self.view.inner_mut().inner_mut().inner_mut().replace(query, identifiers) {
            self.propagate_from_store(event);
        }
    }

    /// Walk a store event up through every layer, then notify observers
    fn propagate_from_store(&mut self, event: ViewEvent) {
        let Some(event) = self.view.inner_mut().inner_mut().on_source_event(event) else {
            return;
        };
        let Some(event) = self.view.inner_mut().on_source_event(event) else {
            return;
        };
        let Some(event) = self.view.on_source_event(event) else {
            return;
        };
        self.notifier.publish(event);
    }

    fn apply_search(&mut self, outcome: SearchOutcome) -> mv_core::Result<bool> {
        let current = matches!(&self.active_search, Some(active) if active.ticket == outcome.ticket);
        if !current {
            debug!(ticket = outcome.ticket, "dropping superseded search result");
            return Ok(false);
        }
        self.active_search = None;

        let identifiers = outcome.result?;
        self.install(outcome.query, identifiers);
        Ok(true)
    }

    fn apply_completion(&mut self, completion: Completion) -> bool {
        match self.view.inner_mut().apply(completion) {
            Ok(Some(event)) => {
                if let Some(event) = self.view.on_source_event(event) {
                    self.notifier.publish(event);
                }
                true
            }
            Ok(None) => false,
            Err(PipelineError::StaleCompletion { .. }) => false,
            Err(e) => {
                warn!(error = %e, "could not apply completion");
                false
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel_search();
    }
}
