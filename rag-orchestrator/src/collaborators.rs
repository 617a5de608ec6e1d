//! Narrow interfaces to the external services the pipeline depends on.
//!
//! Every method returns a boxed future so the traits stay object-safe and
//! can be swapped for deterministic fakes in tests.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use rag_store::MetadataFilters;
use serde_json::Value;
use tracing::debug;

use crate::error::CollaboratorError;
use crate::model::EvidenceNode;
use crate::schema::Judgement;

/// Streamed answer text. Dropping it cancels the upstream generation.
pub type TextStream = BoxStream<'static, Result<String, CollaboratorError>>;

/// Text → fixed-dimension vector.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, CollaboratorError>>;
}

/// Query → scored passages.
pub trait Retriever: Send + Sync {
    fn retrieve<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
        filters: Option<&'a MetadataFilters>,
    ) -> BoxFuture<'a, Result<Vec<EvidenceNode>, CollaboratorError>>;
}

/// Prompt → streamed text.
pub trait Generator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<TextStream, CollaboratorError>>;
}

/// Prompt + JSON schema → JSON value conforming to it.
pub trait Judge: Send + Sync {
    fn judge<'a>(
        &'a self,
        prompt: &'a str,
        schema: &'a Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>>;
}

/// Runs a structured judgment and returns the validated typed result.
///
/// # Errors
/// Propagates the judge's own error; returns [`CollaboratorError::Schema`]
/// when the output does not deserialize into `T` or fails `T::validate`.
pub async fn judge_typed<T: Judgement>(judge: &dyn Judge, prompt: &str) -> Result<T, CollaboratorError> {
    let schema = T::schema();
    let raw = judge.judge(prompt, &schema).await?;
    let typed: T = serde_json::from_value(raw)
        .map_err(|e| CollaboratorError::Schema(format!("{}: {e}", T::NAME)))?;
    typed
        .validate()
        .map_err(|e| CollaboratorError::Schema(format!("{}: {e}", T::NAME)))?;
    debug!(kind = T::NAME, "structured judgment accepted");
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Decision;
    use serde_json::json;

    struct Fixed(Value);

    impl Judge for Fixed {
        fn judge<'a>(&'a self, _: &'a str, _: &'a Value) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[tokio::test]
    async fn typed_judgment_rejects_schema_mismatch() {
        let judge = Fixed(json!({"strategy": "teleport", "confidence": 0.5, "reasoning": ""}));
        let err = judge_typed::<Decision>(&judge, "p").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Schema(_)));
    }

    #[tokio::test]
    async fn typed_judgment_rejects_out_of_range() {
        let judge = Fixed(json!({"strategy": "hybrid", "confidence": 2.0, "reasoning": ""}));
        assert!(judge_typed::<Decision>(&judge, "p").await.is_err());
    }

    #[tokio::test]
    async fn typed_judgment_accepts_valid_output() {
        let judge = Fixed(json!({
            "strategy": "context-only",
            "confidence": 0.8,
            "reasoning": "enough context",
            "suggestedActions": ["answer"]
        }));
        let d = judge_typed::<Decision>(&judge, "p").await.unwrap();
        assert_eq!(d.suggested_actions, vec!["answer"]);
    }
}
