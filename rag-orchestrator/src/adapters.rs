//! Bindings from the collaborator traits to `ai-llm-service` and `rag-store`.

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use futures::future::BoxFuture;
use futures::{StreamExt, TryStreamExt};
use rag_store::{MetadataFilters, RagHit, RagQuery, RagStore};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, debug_span};

use crate::collaborators::{Embedder, Generator, Judge, Retriever, TextStream};
use crate::error::CollaboratorError;
use crate::model::EvidenceNode;

impl Embedder for LlmServiceProfiles {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, CollaboratorError>> {
        Box::pin(async move { Ok(LlmServiceProfiles::embed(self, text).await?) })
    }
}

/// Streams from the slow (answer-quality) profile.
impl Generator for LlmServiceProfiles {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<TextStream, CollaboratorError>> {
        Box::pin(async move {
            let stream = self.generate_stream_slow(prompt, None).await?;
            Ok(stream.map_err(CollaboratorError::from).boxed())
        })
    }
}

/// Structured judgments run on the fast profile.
impl Judge for LlmServiceProfiles {
    fn judge<'a>(&'a self, prompt: &'a str, schema: &'a Value) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move { Ok(self.generate_structured_fast(prompt, schema).await?) })
    }
}

/// Embeds the query text and searches the Qdrant collection.
pub struct QdrantRetriever {
    store: RagStore,
    embedder: Arc<dyn Embedder>,
}

impl QdrantRetriever {
    pub fn new(store: RagStore, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

impl Retriever for QdrantRetriever {
    fn retrieve<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
        filters: Option<&'a MetadataFilters>,
    ) -> BoxFuture<'a, Result<Vec<EvidenceNode>, CollaboratorError>> {
        let span = debug_span!("qdrant_retrieve", top_k, collection = %self.store.config().collection);
        Box::pin(
            async move {
                let vector = self.embedder.embed(query).await?;
                let hits = self
                    .store
                    .search(RagQuery {
                        vector,
                        top_k: top_k as u64,
                        filters,
                    })
                    .await?;
                debug!(hits = hits.len(), "qdrant search returned");
                Ok(hits.into_iter().map(hit_to_node).collect())
            }
            .instrument(span),
        )
    }
}

fn hit_to_node(hit: RagHit) -> EvidenceNode {
    let metadata = match hit.payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    EvidenceNode {
        id: hit.id,
        content: hit.text,
        score: hit.score,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_payload_becomes_metadata() {
        let node = hit_to_node(RagHit {
            id: "7".into(),
            score: 0.42,
            text: Some("passage".into()),
            payload: json!({"filename": "Guide_7.md", "page": 3}),
        });
        assert_eq!(node.filename(), "Guide_7.md");
        assert_eq!(node.content(), "passage");
        assert_eq!(node.metadata["page"], 3);
    }

    #[test]
    fn missing_text_and_odd_payload_degrade() {
        let node = hit_to_node(RagHit {
            id: "8".into(),
            score: 0.1,
            text: None,
            payload: json!("not an object"),
        });
        assert!(node.metadata.is_empty());
        assert_eq!(node.content(), crate::model::CONTENT_UNAVAILABLE);
    }
}
