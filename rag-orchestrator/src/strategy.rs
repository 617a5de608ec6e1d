//! Retrieval strategies and the name-keyed router that dispatches to them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use rag_store::MetadataFilters;
use tracing::{debug, info, instrument};

use crate::collaborators::Retriever;
use crate::context::ContextManager;
use crate::error::{OrchestratorError, Result};
use crate::model::{ConversationHistory, EvidenceNode};
use crate::rerank::{RerankOptions, Reranker};
use crate::schema::StrategyName;

/// Everything a strategy needs for one turn.
#[derive(Clone, Debug)]
pub struct RetrievalRequest<'a> {
    /// The user's query, used for reranking.
    pub query: &'a str,
    /// Text sent to the retrieval backend (the query or its rewrite).
    pub search_text: &'a str,
    pub filters: Option<&'a MetadataFilters>,
    pub history: Option<&'a ConversationHistory>,
    pub options: RetrievalOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalOptions {
    pub strategy: StrategyName,
    /// Candidates requested from the retrieval backend.
    pub top_k: usize,
    pub max_context_nodes: usize,
    pub rerank: RerankOptions,
}

/// A way of producing the final evidence set.
pub trait RetrievalStrategy: Send + Sync {
    fn run<'a>(&'a self, req: &'a RetrievalRequest<'a>) -> BoxFuture<'a, Result<Vec<EvidenceNode>>>;
}

/// Answers from prior-turn evidence only. Never calls the retriever.
pub struct ContextOnly {
    context: Arc<ContextManager>,
}

impl ContextOnly {
    pub fn new(context: Arc<ContextManager>) -> Self {
        Self { context }
    }
}

impl RetrievalStrategy for ContextOnly {
    fn run<'a>(&'a self, req: &'a RetrievalRequest<'a>) -> BoxFuture<'a, Result<Vec<EvidenceNode>>> {
        Box::pin(async move {
            Ok(req
                .history
                .map(|h| self.context.extract_from_history(h, req.options.max_context_nodes))
                .unwrap_or_default())
        })
    }
}

/// Fresh retrieval followed by a rerank.
pub struct FreshSearch {
    retriever: Arc<dyn Retriever>,
    reranker: Arc<Reranker>,
}

impl FreshSearch {
    pub fn new(retriever: Arc<dyn Retriever>, reranker: Arc<Reranker>) -> Self {
        Self { retriever, reranker }
    }
}

async fn retrieve_fresh(retriever: &dyn Retriever, req: &RetrievalRequest<'_>) -> Result<Vec<EvidenceNode>> {
    let nodes = retriever
        .retrieve(req.search_text, req.options.top_k, req.filters)
        .await
        .map_err(OrchestratorError::Retrieval)?;
    debug!(
        requested = req.options.top_k,
        returned = nodes.len(),
        filtered = req.filters.is_some(),
        "fresh retrieval completed"
    );
    Ok(nodes)
}

impl RetrievalStrategy for FreshSearch {
    fn run<'a>(&'a self, req: &'a RetrievalRequest<'a>) -> BoxFuture<'a, Result<Vec<EvidenceNode>>> {
        Box::pin(async move {
            let fresh = retrieve_fresh(self.retriever.as_ref(), req).await?;
            let outcome = self.reranker.rerank(req.query, fresh, &req.options.rerank).await?;
            Ok(outcome.nodes)
        })
    }
}

/// Fresh retrieval merged with prior-turn evidence, reranked with context weighting.
pub struct Combined {
    retriever: Arc<dyn Retriever>,
    context: Arc<ContextManager>,
    reranker: Arc<Reranker>,
}

impl Combined {
    pub fn new(retriever: Arc<dyn Retriever>, context: Arc<ContextManager>, reranker: Arc<Reranker>) -> Self {
        Self {
            retriever,
            context,
            reranker,
        }
    }
}

impl RetrievalStrategy for Combined {
    fn run<'a>(&'a self, req: &'a RetrievalRequest<'a>) -> BoxFuture<'a, Result<Vec<EvidenceNode>>> {
        Box::pin(async move {
            let fresh = retrieve_fresh(self.retriever.as_ref(), req).await?;
            let context_nodes = req
                .history
                .map(|h| self.context.extract_from_history(h, req.options.max_context_nodes))
                .unwrap_or_default();

            let merged = self.context.combine_and_dedupe(context_nodes, fresh);
            let outcome = self
                .reranker
                .context_aware_rerank(req.query, merged, &req.options.rerank)
                .await?;
            Ok(outcome.nodes)
        })
    }
}

/// Name-keyed dispatch table over [`RetrievalStrategy`] implementations.
#[derive(Default)]
pub struct StrategyRouter {
    strategies: HashMap<StrategyName, Arc<dyn RetrievalStrategy>>,
}

impl StrategyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the three built-in strategies registered.
    pub fn standard(
        retriever: Arc<dyn Retriever>,
        context: Arc<ContextManager>,
        reranker: Arc<Reranker>,
    ) -> Self {
        let mut router = Self::new();
        router.register(StrategyName::ContextOnly, Arc::new(ContextOnly::new(context.clone())));
        router.register(
            StrategyName::NewSearch,
            Arc::new(FreshSearch::new(retriever.clone(), reranker.clone())),
        );
        router.register(
            StrategyName::Hybrid,
            Arc::new(Combined::new(retriever, context, reranker)),
        );
        router
    }

    /// Registers (or replaces) the strategy for `name`.
    pub fn register(&mut self, name: StrategyName, strategy: Arc<dyn RetrievalStrategy>) {
        self.strategies.insert(name, strategy);
    }

    pub fn is_registered(&self, name: StrategyName) -> bool {
        self.strategies.contains_key(&name)
    }

    /// Runs the strategy named by `req.options.strategy`.
    ///
    /// # Errors
    /// [`OrchestratorError::UnknownStrategy`] if nothing is registered under that name.
    #[instrument(skip_all, fields(strategy = %req.options.strategy))]
    pub async fn retrieve(&self, req: &RetrievalRequest<'_>) -> Result<Vec<EvidenceNode>> {
        let name = req.options.strategy;
        let strategy = self
            .strategies
            .get(&name)
            .ok_or(OrchestratorError::UnknownStrategy(name))?;
        let nodes = strategy.run(req).await?;
        info!(final_nodes = nodes.len(), "retrieval strategy finished");
        Ok(nodes)
    }
}
