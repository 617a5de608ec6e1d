//! Adaptive retrieval orchestration for conversational question answering.
//!
//! Public entry point: [`RagEngine`]. Per turn it classifies the query
//! against recent history, picks a retrieval strategy (answer from prior
//! evidence, search again, or both), plans the answer shape, gathers and
//! reranks evidence, and streams the generated answer with citations.
//!
//! External services are reached through the traits in [`collaborators`];
//! [`adapters`] binds them to `ai-llm-service` and `rag-store`.

pub mod adapters;
pub mod analyzer;
pub mod cfg;
pub mod collaborators;
pub mod context;
pub mod conversation;
pub mod decision;
pub mod engine;
pub mod error;
pub mod generator;
pub mod model;
pub mod planner;
pub mod progress;
pub mod prompt;
pub mod rerank;
pub mod rewriter;
pub mod schema;
pub mod sources;
pub mod strategy;

pub use adapters::QdrantRetriever;
pub use cfg::OrchestratorConfig;
pub use collaborators::{Embedder, Generator, Judge, Retriever, TextStream};
pub use context::{Combined, ContextManager, DedupPolicy};
pub use conversation::{ConversationStore, MemoryConversationStore, StoreLimits};
pub use decision::{DecisionEngine, DecisionMode};
pub use engine::{Answer, Collaborators, PendingTurn, RagEngine};
pub use error::{CollaboratorError, OrchestratorError, Result};
pub use model::{ConversationHistory, ConversationTurn, EvidenceNode, NewTurn, Query, Source};
pub use progress::{IndicatifProgress, NoopProgress, Progress};
pub use rerank::{RerankOptions, RerankOutcome, RerankStrategy, Reranker};
pub use schema::{Decision, FormatType, QueryAnalysis, QueryType, ResponsePlan, SourcingStrategy, StrategyName};
pub use sources::DomainProfile;
pub use strategy::{RetrievalStrategy, StrategyRouter};
