//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind a minimal API,
//! keeping the rest of the crate decoupled from `qdrant-client` types.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Filter, PointId, SearchParamsBuilder, SearchPointsBuilder, Value as QValue,
    point_id::PointIdOptions, value::Kind,
};
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::errors::RagError;

/// Raw search result: point id, score and JSON payload.
pub(crate) type ScoredPayload = (String, f32, serde_json::Value);

pub struct QdrantFacade {
    client: Qdrant,
    collection: String,
}

impl QdrantFacade {
    /// Creates a new facade from the given configuration.
    ///
    /// Supports optional API key authentication.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: cfg.collection.clone(),
        })
    }

    /// Performs a similarity search; results come back sorted by score.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        top_k: u64,
        filter: Option<Filter>,
        exact: bool,
    ) -> Result<Vec<ScoredPayload>, RagError> {
        info!(
            collection = %self.collection,
            top_k,
            filtered = filter.is_some(),
            exact,
            "qdrant search"
        );

        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, top_k).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        if exact {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        let out: Vec<ScoredPayload> = res
            .result
            .into_iter()
            .map(|r| (point_id_string(r.id), r.score, qpayload_to_json(r.payload)))
            .collect();

        debug!(hits = out.len(), "qdrant search completed");
        Ok(out)
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u,
        None => String::new(),
    }
}

/// Converts a Qdrant payload into a JSON object.
pub(crate) fn qpayload_to_json(p: HashMap<String, QValue>) -> serde_json::Value {
    serde_json::Value::Object(p.into_iter().map(|(k, v)| (k, qvalue_to_json(v))).collect())
}

fn qvalue_to_json(v: QValue) -> serde_json::Value {
    match v.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(f)) => serde_json::json!(f),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qvalue_to_json).collect())
        }
        Some(Kind::StructValue(s)) => qpayload_to_json(s.fields),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{ListValue, Struct};

    fn s(v: &str) -> QValue {
        QValue {
            kind: Some(Kind::StringValue(v.into())),
        }
    }

    #[test]
    fn nested_payload_converts_to_json() {
        let mut inner = HashMap::new();
        inner.insert("page".to_string(), QValue { kind: Some(Kind::IntegerValue(3)) });

        let mut p = HashMap::new();
        p.insert("filename".to_string(), s("Policy_12345.md"));
        p.insert(
            "tags".to_string(),
            QValue {
                kind: Some(Kind::ListValue(ListValue { values: vec![s("hr"), s("leave")] })),
            },
        );
        p.insert(
            "meta".to_string(),
            QValue { kind: Some(Kind::StructValue(Struct { fields: inner })) },
        );

        let j = qpayload_to_json(p);
        assert_eq!(j["filename"], "Policy_12345.md");
        assert_eq!(j["tags"][1], "leave");
        assert_eq!(j["meta"]["page"], 3);
    }

    #[test]
    fn point_ids_render_as_strings() {
        let num = PointId { point_id_options: Some(PointIdOptions::Num(42)) };
        assert_eq!(point_id_string(Some(num)), "42");
        assert_eq!(point_id_string(None), "");
    }
}
