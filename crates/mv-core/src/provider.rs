//! Boundary to the remote catalog

use async_trait::async_trait;

use crate::{ObjectId, ProviderError, Query, RecordDetails};

/// Trait for remote catalogs that list identifiers and resolve record details
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Run a search and return identifiers ordered by provider relevance
    async fn search(&self, query: &Query) -> Result<Vec<ObjectId>, ProviderError>;
    
    /// Resolve the detail fields of a single object
    async fn fetch_detail(&self, identifier: ObjectId) -> Result<RecordDetails, ProviderError>;
    
    /// List every identifier the catalog knows about
    async fn list_all_identifiers(&self) -> Result<Vec<ObjectId>, ProviderError>;
    
    /// Get the provider name (used in logs)
    fn provider_name(&self) -> &str;
}
