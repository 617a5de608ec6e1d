//! Runtime configuration for the retrieval backend.

use std::str::FromStr;

use crate::errors::RagError;

/// Configuration for retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    /// Target collection name.
    pub collection: String,
    /// Exact search flag (false = HNSW ANN).
    pub exact_search: bool,
    /// Payload key holding the passage text.
    pub text_field: String,
}

impl RagConfig {
    /// Creates a sane default config for a given collection name and Qdrant endpoint.
    pub fn new_default(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            qdrant_api_key: None,
            collection: collection.into(),
            exact_search: false,
            text_field: "text".into(),
        }
    }

    /// Reads `QDRANT_URL`, `QDRANT_API_KEY`, `QDRANT_COLLECTION`,
    /// `RAG_EXACT_SEARCH` and `RAG_TEXT_FIELD`, then validates.
    pub fn from_env() -> Result<Self, RagError> {
        let cfg = Self {
            qdrant_url: env("QDRANT_URL", "http://localhost:6334"),
            qdrant_api_key: std::env::var("QDRANT_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            collection: env("QDRANT_COLLECTION", "documents"),
            exact_search: parse("RAG_EXACT_SEARCH", false)?,
            text_field: env("RAG_TEXT_FIELD", "text"),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.qdrant_url.trim().is_empty() {
            return Err(RagError::Config("qdrant_url is empty".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::Config("collection is empty".into()));
        }
        if self.text_field.trim().is_empty() {
            return Err(RagError::Config("text_field is empty".into()));
        }
        Ok(())
    }
}

fn env(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse<T: FromStr>(name: &str, default: T) -> Result<T, RagError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| RagError::Config(format!("{name} has an invalid value: {v}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RagConfig::new_default("http://localhost:6334", "docs").validate().is_ok());
    }

    #[test]
    fn empty_collection_is_rejected() {
        let cfg = RagConfig::new_default("http://localhost:6334", " ");
        assert!(matches!(cfg.validate(), Err(RagError::Config(_))));
    }
}
