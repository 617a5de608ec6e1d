//! Retrieval facade over Qdrant.
//!
//! Callers supply a query vector, a `top_k` and optional metadata filters
//! and get back scored passages with their payload.

mod config;
mod errors;
mod filters;
mod qdrant_facade;
mod record;
mod retrieve;

pub use config::RagConfig;
pub use errors::RagError;
pub use filters::{FILENAME_KEY, FilterCondition, FilterOperator, MetadataFilter, MetadataFilters};
pub use record::{RagHit, RagQuery};

use tracing::trace;

/// High-level facade that wires configuration and Qdrant client.
pub struct RagStore {
    cfg: RagConfig,
    client: qdrant_facade::QdrantFacade,
}

impl RagStore {
    /// Constructs a new store from the given configuration.
    ///
    /// # Errors
    /// Returns `RagError::Config` or `RagError::Qdrant` if the client cannot be built.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        trace!(collection = %cfg.collection, "RagStore::new");
        let client = qdrant_facade::QdrantFacade::new(&cfg)?;
        Ok(Self { cfg, client })
    }

    /// Filtered similarity search for a ready query vector.
    ///
    /// # Errors
    /// Returns `RagError::Qdrant` if search fails.
    pub async fn search(&self, query: RagQuery<'_>) -> Result<Vec<RagHit>, RagError> {
        retrieve::search(&self.cfg, &self.client, query).await
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }
}
