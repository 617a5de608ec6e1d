//! The turn pipeline: analyze → decide → plan → retrieve → generate → record.
//!
//! [`RagEngine::ask`] runs every stage up to the start of generation and
//! hands back a [`PendingTurn`] holding the answer stream. The caller drains
//! the stream and passes the full text to [`RagEngine::record_turn`].
//! A per-conversation lock is held from the history read until the turn is
//! recorded or dropped, so turns of one conversation never interleave.

use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{info, instrument};

use crate::analyzer::QueryAnalyzer;
use crate::cfg::OrchestratorConfig;
use crate::collaborators::{Embedder, Generator, Judge, Retriever, TextStream};
use crate::conversation::{ConversationStore, TurnGuard, TurnLocks};
use crate::decision::DecisionEngine;
use crate::error::{OrchestratorError, Result};
use crate::generator::ResponseGenerator;
use crate::model::{ConversationHistory, ConversationTurn, EvidenceNode, NewTurn, Query, Source};
use crate::planner::ResponsePlanner;
use crate::progress::{NoopProgress, Progress};
use crate::rerank::{RerankOptions, Reranker};
use crate::rewriter::QueryRewriter;
use crate::schema::{Decision, QueryAnalysis, ResponsePlan, StrategyName};
use crate::strategy::{RetrievalOptions, RetrievalRequest, StrategyRouter};

const PIPELINE_STEPS: u64 = 5;

/// External services the engine is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub judge: Arc<dyn Judge>,
    pub store: Arc<dyn ConversationStore>,
}

/// A turn whose answer is still streaming.
pub struct PendingTurn {
    /// Answer text chunks. Dropping the turn cancels generation.
    pub stream: TextStream,
    pub conversation_id: String,
    pub query: Query,
    pub analysis: QueryAnalysis,
    pub decision: Decision,
    pub plan: ResponsePlan,
    pub nodes: Vec<EvidenceNode>,
    pub sources: Vec<Source>,
    _guard: TurnGuard,
}

/// A completed and recorded turn.
#[derive(Clone, Debug)]
pub struct Answer {
    pub turn: ConversationTurn,
    pub decision: Decision,
    pub plan: ResponsePlan,
}

pub struct RagEngine {
    store: Arc<dyn ConversationStore>,
    locks: TurnLocks,
    analyzer: QueryAnalyzer,
    decision: DecisionEngine,
    planner: ResponsePlanner,
    rewriter: Option<QueryRewriter>,
    router: StrategyRouter,
    generator: ResponseGenerator,
    retrieval_top_k: usize,
    max_context_nodes: usize,
    history_window: usize,
    rerank: RerankOptions,
    progress: Arc<dyn Progress>,
}

impl RagEngine {
    /// Wires the stages with the standard strategy router.
    pub fn new(cfg: &OrchestratorConfig, c: Collaborators) -> Self {
        let context = Arc::new(cfg.context.clone());
        let reranker = Arc::new(Reranker::new(c.embedder.clone(), c.judge.clone()));
        let router = StrategyRouter::standard(c.retriever.clone(), context, reranker);

        Self {
            store: c.store,
            locks: TurnLocks::default(),
            analyzer: QueryAnalyzer::new(c.judge.clone(), cfg.history_window),
            decision: DecisionEngine::new(cfg.decision_mode, cfg.context_threshold, c.judge.clone()),
            planner: ResponsePlanner::new(c.judge.clone()),
            rewriter: cfg.query_rewrite.then(|| QueryRewriter::new(c.judge.clone())),
            router,
            generator: ResponseGenerator::new(c.generator, cfg.domain.clone(), cfg.max_prompt_bytes),
            retrieval_top_k: cfg.retrieval_top_k,
            max_context_nodes: cfg.max_context_nodes,
            history_window: cfg.history_window,
            rerank: cfg.rerank.clone(),
            progress: Arc::new(NoopProgress),
        }
    }

    /// Replaces the strategy router (custom or partial registrations).
    pub fn with_router(mut self, router: StrategyRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Runs one turn up to the start of answer generation.
    ///
    /// # Errors
    /// The first failing stage's [`OrchestratorError`]. Planning never fails;
    /// it falls back to [`ResponsePlan::fallback`].
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn ask(&self, conversation_id: &str, query: Query) -> Result<PendingTurn> {
        let guard = self.locks.acquire(conversation_id).await;
        self.progress.set_total(PIPELINE_STEPS);

        let history = self
            .store
            .get(conversation_id)
            .await
            .map_err(OrchestratorError::Store)?;
        let recent = history
            .as_ref()
            .map(|h| h.recent(self.history_window))
            .unwrap_or_default();

        self.progress.step("analyzing query");
        let analysis = self.analyzer.analyze(&query.text, history.as_ref()).await?;

        self.progress.step("choosing strategy");
        let decision = self.decision.decide(&query.text, &analysis).await?;

        self.progress.step("planning response");
        let plan = self.planner.plan(&query.text, &analysis, &decision).await;

        self.progress.step("retrieving evidence");
        let search_text = match &self.rewriter {
            Some(rw) if decision.strategy != StrategyName::ContextOnly => rw.rewrite(&query.text, recent).await,
            _ => query.text.clone(),
        };
        let nodes = self
            .retrieve(&query, &search_text, history.as_ref(), decision.strategy)
            .await?;

        self.progress.step("generating answer");
        let generated = self
            .generator
            .generate(&query.text, &nodes, &plan, Some(&decision), recent)
            .await?;
        self.progress.finish("ready");

        info!(
            strategy = %decision.strategy,
            format = ?plan.format_type,
            evidence = nodes.len(),
            sources = generated.sources.len(),
            "turn prepared, streaming answer"
        );

        Ok(PendingTurn {
            stream: generated.stream,
            conversation_id: conversation_id.to_string(),
            query,
            analysis,
            decision,
            plan,
            nodes,
            sources: generated.sources,
            _guard: guard,
        })
    }

    async fn retrieve(
        &self,
        query: &Query,
        search_text: &str,
        history: Option<&ConversationHistory>,
        strategy: StrategyName,
    ) -> Result<Vec<EvidenceNode>> {
        let filters = query.filters();
        let req = RetrievalRequest {
            query: &query.text,
            search_text,
            filters: filters.as_ref(),
            history,
            options: RetrievalOptions {
                strategy,
                top_k: self.retrieval_top_k,
                max_context_nodes: self.max_context_nodes,
                rerank: self.rerank.clone(),
            },
        };
        self.router.retrieve(&req).await
    }

    /// Appends the finished turn and releases the conversation lock.
    ///
    /// # Errors
    /// [`OrchestratorError::Store`] if the append fails.
    pub async fn record_turn(&self, pending: PendingTurn, response: String) -> Result<ConversationTurn> {
        let turn = self
            .store
            .append(
                &pending.conversation_id,
                NewTurn {
                    query: pending.query.text,
                    response,
                    nodes: pending.nodes,
                    sources: pending.sources,
                },
            )
            .await
            .map_err(OrchestratorError::Store)?;
        info!(conversation_id = %pending.conversation_id, turn_id = %turn.id, "turn recorded");
        Ok(turn)
    }

    /// `ask`, drain the stream, `record_turn`.
    ///
    /// # Errors
    /// Any stage error; a stream failure is [`OrchestratorError::Generation`]
    /// and leaves the history untouched.
    pub async fn answer(&self, conversation_id: &str, query: Query) -> Result<Answer> {
        let mut pending = self.ask(conversation_id, query).await?;
        let chunks: Vec<String> = (&mut pending.stream)
            .try_collect()
            .await
            .map_err(OrchestratorError::Generation)?;

        let decision = pending.decision.clone();
        let plan = pending.plan.clone();
        let turn = self.record_turn(pending, chunks.concat()).await?;
        Ok(Answer { turn, decision, plan })
    }

    pub async fn history(&self, conversation_id: &str) -> Result<Option<ConversationHistory>> {
        self.store.get(conversation_id).await.map_err(OrchestratorError::Store)
    }

    /// Drops a conversation. Waits for an in-flight turn of it to finish.
    pub async fn clear(&self, conversation_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(conversation_id).await;
        self.store.clear(conversation_id).await.map_err(OrchestratorError::Store)
    }
}
