//! Candidate reranking: semantic, hybrid and judge-based strategies.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, instrument};

use crate::collaborators::{Embedder, Judge, judge_typed};
use crate::context::Combined;
use crate::error::{OrchestratorError, Result};
use crate::model::EvidenceNode;
use crate::schema::RerankScores;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RerankStrategy {
    Semantic,
    #[default]
    Hybrid,
    Judge,
}

impl fmt::Display for RerankStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RerankStrategy::Semantic => "semantic",
            RerankStrategy::Hybrid => "hybrid",
            RerankStrategy::Judge => "judge",
        })
    }
}

impl FromStr for RerankStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "semantic" => Ok(RerankStrategy::Semantic),
            "hybrid" => Ok(RerankStrategy::Hybrid),
            "judge" | "llm" => Ok(RerankStrategy::Judge),
            other => Err(format!("unknown rerank strategy: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerankOptions {
    pub strategy: RerankStrategy,
    /// Cutoff applied after sorting; `None` keeps everything.
    pub top_k: Option<usize>,
    /// Weight of the semantic rank in the hybrid blend.
    pub semantic_weight: f32,
    /// Minimum judge score kept by the judge strategy.
    pub threshold: f32,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::Hybrid,
            top_k: None,
            semantic_weight: 0.7,
            threshold: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerankOutcome {
    pub nodes: Vec<EvidenceNode>,
    pub original_count: usize,
    pub reranked_count: usize,
    pub strategy: RerankStrategy,
}

/// Cosine similarity; 0 when either vector has zero magnitude or the
/// dimensions differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Node `i` of the context prefix is multiplied by `1 + 0.2 × (context_count − i)`
/// when its surviving copy came from context. Fresh nodes keep their score.
fn positional_boost(combined: Combined) -> Vec<EvidenceNode> {
    let Combined {
        nodes,
        context_count,
        from_context,
    } = combined;
    nodes
        .into_iter()
        .zip(from_context)
        .enumerate()
        .map(|(i, (n, is_context))| {
            if is_context && i < context_count {
                let score = n.score * (1.0 + 0.2 * (context_count - i) as f32);
                n.rescored(score)
            } else {
                n
            }
        })
        .collect()
}

fn sort_desc(nodes: &mut [EvidenceNode]) {
    nodes.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub struct Reranker {
    embedder: Arc<dyn Embedder>,
    judge: Arc<dyn Judge>,
}

impl Reranker {
    pub fn new(embedder: Arc<dyn Embedder>, judge: Arc<dyn Judge>) -> Self {
        Self { embedder, judge }
    }

    /// Reranks `nodes` for `query` with the chosen strategy, then applies `top_k`.
    #[instrument(skip_all, fields(strategy = %opts.strategy, candidates = nodes.len()))]
    pub async fn rerank(
        &self,
        query: &str,
        nodes: Vec<EvidenceNode>,
        opts: &RerankOptions,
    ) -> Result<RerankOutcome> {
        let original_count = nodes.len();
        let mut ranked = if nodes.is_empty() {
            nodes
        } else {
            match opts.strategy {
                RerankStrategy::Semantic => self.semantic(query, nodes).await?,
                RerankStrategy::Hybrid => self.hybrid(query, nodes, opts.semantic_weight).await?,
                RerankStrategy::Judge => self.judge_scores(query, nodes, opts.threshold).await?,
            }
        };
        if let Some(k) = opts.top_k {
            ranked.truncate(k);
        }

        debug!(
            original = original_count,
            reranked = ranked.len(),
            "rerank completed"
        );
        Ok(RerankOutcome {
            reranked_count: ranked.len(),
            nodes: ranked,
            original_count,
            strategy: opts.strategy,
        })
    }

    /// Boosts context-derived nodes by position, then reranks.
    pub async fn context_aware_rerank(
        &self,
        query: &str,
        combined: Combined,
        opts: &RerankOptions,
    ) -> Result<RerankOutcome> {
        self.rerank(query, positional_boost(combined), opts).await
    }

    /// Replaces every score with cosine(query, content), sorted descending.
    ///
    /// The query and all candidates are embedded concurrently.
    async fn semantic(&self, query: &str, nodes: Vec<EvidenceNode>) -> Result<Vec<EvidenceNode>> {
        let query_embedding = self.embedder.embed(query);
        let node_embeddings = try_join_all(nodes.iter().map(|n| self.embedder.embed(n.content())));
        let (qv, vectors) = futures::try_join!(query_embedding, node_embeddings)
            .map_err(OrchestratorError::Embedding)?;

        let mut scored: Vec<EvidenceNode> = nodes
            .into_iter()
            .zip(vectors)
            .map(|(n, v)| {
                let s = cosine(&qv, &v);
                n.rescored(s)
            })
            .collect();
        sort_desc(&mut scored);
        Ok(scored)
    }

    /// Blends semantic rank (`1 − i/N`) with the original score.
    async fn hybrid(
        &self,
        query: &str,
        nodes: Vec<EvidenceNode>,
        weight: f32,
    ) -> Result<Vec<EvidenceNode>> {
        let original: std::collections::HashMap<String, f32> =
            nodes.iter().map(|n| (n.id.clone(), n.score)).collect();
        let ranked = self.semantic(query, nodes).await?;
        Ok(blend_ranked(ranked, &original, weight))
    }

    /// Asks the judge for a relevance score per index, keeps scores at or
    /// above `threshold`, sorted descending.
    async fn judge_scores(
        &self,
        query: &str,
        nodes: Vec<EvidenceNode>,
        threshold: f32,
    ) -> Result<Vec<EvidenceNode>> {
        let prompt = judge_prompt(query, &nodes);
        let scores = judge_typed::<RerankScores>(self.judge.as_ref(), &prompt)
            .await
            .map_err(OrchestratorError::Rerank)?;
        scores
            .check_coverage(nodes.len())
            .map_err(|e| OrchestratorError::Rerank(crate::error::CollaboratorError::Schema(e)))?;
        Ok(apply_judge_scores(nodes, &scores, threshold))
    }
}

/// `ranked` is in semantic order; `original` maps ids to pre-rerank scores.
fn blend_ranked(
    ranked: Vec<EvidenceNode>,
    original: &std::collections::HashMap<String, f32>,
    weight: f32,
) -> Vec<EvidenceNode> {
    let n = ranked.len() as f32;
    let mut blended: Vec<EvidenceNode> = ranked
        .into_iter()
        .enumerate()
        .map(|(i, node)| {
            let semantic = 1.0 - i as f32 / n;
            let orig = original.get(&node.id).copied().unwrap_or(0.0);
            let score = weight * semantic + (1.0 - weight) * orig;
            node.rescored(score)
        })
        .collect();
    sort_desc(&mut blended);
    blended
}

fn apply_judge_scores(nodes: Vec<EvidenceNode>, scores: &RerankScores, threshold: f32) -> Vec<EvidenceNode> {
    let mut by_index: Vec<Option<f32>> = vec![None; nodes.len()];
    for s in &scores.scores {
        if let Some(slot) = by_index.get_mut(s.index) {
            *slot = Some(s.score);
        }
    }
    let mut kept: Vec<EvidenceNode> = nodes
        .into_iter()
        .zip(by_index)
        .filter_map(|(n, s)| s.filter(|s| *s >= threshold).map(|s| n.rescored(s)))
        .collect();
    sort_desc(&mut kept);
    kept
}

fn judge_prompt(query: &str, nodes: &[EvidenceNode]) -> String {
    let chunks: String = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| {
            format!(
                "<chunk id=\"{i}\" filename=\"{}\">\n<content>{}</content>\n</chunk>\n",
                n.filename(),
                n.content()
            )
        })
        .collect();
    format!(
        "Rate how relevant each chunk is to the query on a scale from 0 to 1.\n\
         Return one score for every chunk index from 0 to {last}.\n\n\
         <query>{query}</query>\n\n<chunks>\n{chunks}</chunks>",
        last = nodes.len().saturating_sub(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::schema::IndexScore;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    /// Embeds by lookup: known texts map to fixed vectors.
    struct TableEmbedder(HashMap<String, Vec<f32>>);

    impl Embedder for TableEmbedder {
        fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, std::result::Result<Vec<f32>, CollaboratorError>> {
            Box::pin(async move {
                self.0
                    .get(text)
                    .cloned()
                    .ok_or_else(|| CollaboratorError::Unavailable(format!("no vector for {text}")))
            })
        }
    }

    struct FixedJudge(Value);

    impl Judge for FixedJudge {
        fn judge<'a>(&'a self, _: &'a str, _: &'a Value) -> BoxFuture<'a, std::result::Result<Value, CollaboratorError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    /// Query vector is [1, 0]; candidate `i` gets cosine `sims[i]` exactly.
    fn reranker(sims: &[f32], judge: Value) -> (Reranker, Vec<EvidenceNode>) {
        let mut table = HashMap::new();
        table.insert("q".to_string(), vec![1.0, 0.0]);
        let mut nodes = Vec::new();
        for (i, s) in sims.iter().enumerate() {
            let text = format!("doc{i}");
            table.insert(text.clone(), vec![*s, (1.0 - s * s).sqrt()]);
            nodes.push(EvidenceNode::new(format!("n{i}"), text, 0.5));
        }
        let r = Reranker::new(Arc::new(TableEmbedder(table)), Arc::new(FixedJudge(judge)));
        (r, nodes)
    }

    fn opts(strategy: RerankStrategy) -> RerankOptions {
        RerankOptions {
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
        assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn semantic_orders_by_similarity() {
        let (r, nodes) = reranker(&[0.2, 0.9, 0.5], json!({}));
        let out = r.rerank("q", nodes, &opts(RerankStrategy::Semantic)).await.unwrap();
        let scores: Vec<f32> = out.nodes.iter().map(|n| (n.score * 100.0).round() / 100.0).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);
        assert_eq!(out.nodes[0].id, "n1");
        assert_eq!(out.original_count, 3);
    }

    #[test]
    fn hybrid_blend_matches_weighted_formula() {
        // Semantic order [a, b] → normalized [1.0, 0.5]; originals [0.4, 0.9].
        let ranked = vec![EvidenceNode::new("a", "x", 0.0), EvidenceNode::new("b", "y", 0.0)];
        let original: HashMap<String, f32> = [("a".to_string(), 0.4), ("b".to_string(), 0.9)].into();
        let out = blend_ranked(ranked, &original, 0.7);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[1].id, "b");
        assert!((out[0].score - 0.82).abs() < 1e-6);
        assert!((out[1].score - 0.62).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hybrid_uses_semantic_rank_and_original_score() {
        let (r, mut nodes) = reranker(&[0.3, 0.8], json!({}));
        nodes[0].score = 0.9;
        nodes[1].score = 0.4;
        let out = r.rerank("q", nodes, &opts(RerankStrategy::Hybrid)).await.unwrap();
        // n1 ranks first semantically: 0.7 × 1.0 + 0.3 × 0.4 = 0.82.
        assert_eq!(out.nodes[0].id, "n1");
        assert!((out.nodes[0].score - 0.82).abs() < 1e-6);
        assert!((out.nodes[1].score - 0.62).abs() < 1e-6);
    }

    #[tokio::test]
    async fn judge_filters_below_threshold_and_sorts() {
        let judge = json!({"scores": [
            {"index": 0, "score": 0.9},
            {"index": 1, "score": 0.3},
            {"index": 2, "score": 0.6}
        ]});
        let (r, nodes) = reranker(&[0.1, 0.2, 0.3], judge);
        let out = r.rerank("q", nodes, &opts(RerankStrategy::Judge)).await.unwrap();
        let ids: Vec<_> = out.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n0", "n2"]);
        assert_eq!(out.nodes[0].score, 0.9);
        assert_eq!(out.nodes[1].score, 0.6);
        assert_eq!(out.reranked_count, 2);
    }

    #[tokio::test]
    async fn judge_schema_violation_fails_the_stage() {
        let (r, nodes) = reranker(&[0.1, 0.2], json!({"scores": [{"index": 0, "score": 0.9}]}));
        let err = r.rerank("q", nodes, &opts(RerankStrategy::Judge)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Rerank(CollaboratorError::Schema(_))));

        let (r, nodes) = reranker(&[0.1], json!({"ranking": []}));
        assert!(r.rerank("q", nodes, &opts(RerankStrategy::Judge)).await.is_err());
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_as_embedding_error() {
        let (r, mut nodes) = reranker(&[0.5], json!({}));
        nodes[0].content = Some("unknown text".into());
        let err = r.rerank("q", nodes, &opts(RerankStrategy::Semantic)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Embedding(_)));
    }

    #[tokio::test]
    async fn top_k_applies_after_sorting() {
        let (r, nodes) = reranker(&[0.2, 0.9, 0.5], json!({}));
        let o = RerankOptions {
            strategy: RerankStrategy::Semantic,
            top_k: Some(1),
            ..Default::default()
        };
        let out = r.rerank("q", nodes, &o).await.unwrap();
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(out.nodes[0].id, "n1");
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let r = Reranker::new(
            Arc::new(TableEmbedder(HashMap::new())),
            Arc::new(FixedJudge(json!(null))),
        );
        let out = r.rerank("q", vec![], &opts(RerankStrategy::Judge)).await.unwrap();
        assert!(out.nodes.is_empty());
    }

    #[test]
    fn judge_scores_map_back_by_index() {
        let nodes = vec![EvidenceNode::new("a", "x", 0.0), EvidenceNode::new("b", "y", 0.0)];
        let scores = RerankScores {
            scores: vec![IndexScore { index: 1, score: 0.7 }, IndexScore { index: 0, score: 0.5 }],
        };
        let out = apply_judge_scores(nodes, &scores, 0.5);
        assert_eq!(out[0].id, "b");
        assert_eq!(out[1].id, "a");
    }

    #[test]
    fn judge_prompt_lists_indexed_chunks() {
        let nodes = vec![EvidenceNode::new("a", "alpha", 0.0).with_filename("A_1.md")];
        let p = judge_prompt("what?", &nodes);
        assert!(p.contains("<chunk id=\"0\" filename=\"A_1.md\">"));
        assert!(p.contains("<content>alpha</content>"));
        assert!(p.contains("<query>what?</query>"));
    }

    #[test]
    fn positional_boost_skips_fresh_copies_in_context_slots() {
        let cm = crate::context::ContextManager {
            dedup: crate::context::DedupPolicy::MaxScore,
            ..Default::default()
        };
        let combined = cm.combine_and_dedupe(
            vec![EvidenceNode::new("x", "context copy", 0.5), EvidenceNode::new("y", "kept", 0.5)],
            vec![EvidenceNode::new("x", "fresh copy", 0.95), EvidenceNode::new("z", "new", 0.4)],
        );
        assert_eq!(combined.context_count, 2);
        assert_eq!(combined.from_context, vec![false, true, false]);

        let out = positional_boost(combined);
        // Fresh copy of x keeps its own score.
        assert_eq!(out[0].content(), "fresh copy");
        assert_eq!(out[0].score, 0.95);
        // y sits at prefix position 1 of 2: 0.5 × 1.2 × (1 + 0.2).
        assert!((out[1].score - 0.72).abs() < 1e-6);
        assert_eq!(out[2].score, 0.4);
    }
}
