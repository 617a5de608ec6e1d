//! Typed errors for the orchestrator.
//!
//! Collaborators report [`CollaboratorError`]; the pipeline wraps it in the
//! [`OrchestratorError`] variant naming the stage that failed.

use thiserror::Error;

use crate::schema::StrategyName;

/// Failure reported by an external collaborator (LLM, retrieval backend, store).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Errors from the LLM provider layer.
    #[error("LLM error: {0}")]
    Llm(#[from] ai_llm_service::AiLlmError),

    /// Errors from the rag-store crate.
    #[error("RAG error: {0}")]
    Rag(#[from] rag_store::RagError),

    /// Structured output did not match the requested schema.
    #[error("schema violation: {0}")]
    Schema(String),

    /// Anything else a custom collaborator wants to report.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Error surfaced to the caller of a turn.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("query analysis failed: {0}")]
    Analysis(#[source] CollaboratorError),

    #[error("strategy decision failed: {0}")]
    Decision(#[source] CollaboratorError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] CollaboratorError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] CollaboratorError),

    #[error("rerank failed: {0}")]
    Rerank(#[source] CollaboratorError),

    #[error("generation failed: {0}")]
    Generation(#[source] CollaboratorError),

    #[error("conversation store failed: {0}")]
    Store(#[source] CollaboratorError),

    /// The decision named a strategy the router has no entry for.
    #[error("unknown retrieval strategy: {0}")]
    UnknownStrategy(StrategyName),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
