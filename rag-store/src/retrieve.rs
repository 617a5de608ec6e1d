//! Retrieval: vector search plus payload-to-hit mapping.

use tracing::trace;

use crate::config::RagConfig;
use crate::errors::RagError;
use crate::filters::to_qdrant_filter;
use crate::qdrant_facade::{QdrantFacade, ScoredPayload};
use crate::record::{RagHit, RagQuery};

/// Runs a filtered vector search and maps raw results to [`RagHit`]s.
pub async fn search(
    cfg: &RagConfig,
    client: &QdrantFacade,
    query: RagQuery<'_>,
) -> Result<Vec<RagHit>, RagError> {
    let filter = query
        .filters
        .filter(|f| !f.is_empty())
        .map(to_qdrant_filter)
        .transpose()?;
    trace!(top_k = query.top_k, filtered = filter.is_some(), "retrieve::search");

    let raw = client
        .search(query.vector, query.top_k, filter, cfg.exact_search)
        .await?;
    Ok(raw.into_iter().map(|r| to_hit(&cfg.text_field, r)).collect())
}

fn to_hit(text_field: &str, (id, score, payload): ScoredPayload) -> RagHit {
    let text = payload
        .get(text_field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    RagHit {
        id,
        score,
        text,
        payload,
    }
}
