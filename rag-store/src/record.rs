//! Core data models used by the library.

use serde::Serialize;
use serde_json::Value;

use crate::filters::MetadataFilters;

/// Query parameters for retrieval by vector.
#[derive(Clone, Debug)]
pub struct RagQuery<'a> {
    pub vector: Vec<f32>,
    pub top_k: u64,
    pub filters: Option<&'a MetadataFilters>,
}

/// A single retrieval hit.
///
/// `text` is `None` when the payload carries no readable passage text.
#[derive(Clone, Debug, Serialize)]
pub struct RagHit {
    pub id: String,
    pub score: f32,
    pub text: Option<String>,
    pub payload: Value,
}
