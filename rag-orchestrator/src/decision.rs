//! Strategy selection from a query analysis.
//!
//! One mode is active per engine: the deterministic rule (default) or a
//! second structured judgment that names the strategy directly.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::collaborators::{Judge, judge_typed};
use crate::error::{OrchestratorError, Result};
use crate::schema::{Decision, QueryAnalysis, StrategyName};

/// Lower bound of the relevance band that still allows a hybrid follow-up.
const HYBRID_FLOOR: f32 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecisionMode {
    #[default]
    Rule,
    Judge,
}

impl FromStr for DecisionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "rule" => Ok(DecisionMode::Rule),
            "judge" | "llm" => Ok(DecisionMode::Judge),
            other => Err(format!("unknown decision mode: {other}")),
        }
    }
}

pub struct DecisionEngine {
    mode: DecisionMode,
    /// τ: minimum context relevance for answering from context alone.
    threshold: f32,
    judge: Arc<dyn Judge>,
}

impl DecisionEngine {
    pub fn new(mode: DecisionMode, threshold: f32, judge: Arc<dyn Judge>) -> Self {
        Self { mode, threshold, judge }
    }

    pub fn mode(&self) -> DecisionMode {
        self.mode
    }

    /// # Errors
    /// [`OrchestratorError::Decision`] when the judge mode fails. Rule mode
    /// never fails.
    #[instrument(skip_all, fields(mode = ?self.mode))]
    pub async fn decide(&self, query: &str, analysis: &QueryAnalysis) -> Result<Decision> {
        let decision = match self.mode {
            DecisionMode::Rule => rule_based(analysis, self.threshold),
            DecisionMode::Judge => {
                let prompt = decision_prompt(query, analysis, self.threshold);
                judge_typed::<Decision>(self.judge.as_ref(), &prompt)
                    .await
                    .map_err(OrchestratorError::Decision)?
            }
        };
        info!(
            strategy = %decision.strategy,
            confidence = decision.confidence,
            "retrieval strategy chosen"
        );
        Ok(decision)
    }
}

/// Deterministic mapping from analysis to strategy.
///
/// - `!requires_new_search && relevance ≥ τ` → context-only, confidence +0.1 (capped at 1)
/// - `is_follow_up && 0.3 ≤ relevance < τ` → hybrid, confidence unchanged
/// - otherwise → new-search, confidence at least 0.8
pub fn rule_based(analysis: &QueryAnalysis, threshold: f32) -> Decision {
    let rel = analysis.context_relevance;
    let (strategy, confidence, note) = if !analysis.requires_new_search && rel >= threshold {
        (
            StrategyName::ContextOnly,
            (analysis.confidence + 0.1).min(1.0),
            format!("High context relevance ({rel:.2}) suggests context is sufficient."),
        )
    } else if analysis.is_follow_up && (HYBRID_FLOOR..threshold).contains(&rel) {
        (
            StrategyName::Hybrid,
            analysis.confidence,
            format!("Moderate context relevance ({rel:.2}) requires hybrid approach."),
        )
    } else {
        (
            StrategyName::NewSearch,
            analysis.confidence.max(0.8),
            format!("Low context relevance ({rel:.2}) or new topic requires fresh search."),
        )
    };

    Decision {
        strategy,
        confidence,
        reasoning: format!("AI Analysis: {}. {note}", analysis.reasoning),
        suggested_actions: analysis.missing_information.clone(),
    }
}

fn decision_prompt(query: &str, analysis: &QueryAnalysis, threshold: f32) -> String {
    format!(
        "Choose how to gather evidence for the query.\n\
         - context-only: the previous conversation already holds the answer.\n\
         - new-search: search the documents again.\n\
         - hybrid: combine previous context with a new search.\n\
         Prefer context-only only when context relevance is at least {threshold:.2}.\n\n\
         Query: {query}\n\
         Query type: {:?}\n\
         Follow-up: {}\n\
         Context relevance: {:.2}\n\
         Requires new search: {}\n\
         Analysis: {}\n\
         Missing information: {}",
        analysis.query_type,
        analysis.is_follow_up,
        analysis.context_relevance,
        analysis.requires_new_search,
        analysis.reasoning,
        analysis.missing_information.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::schema::QueryType;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};

    struct FixedJudge(Value);

    impl Judge for FixedJudge {
        fn judge<'a>(&'a self, _: &'a str, _: &'a Value) -> BoxFuture<'a, std::result::Result<Value, CollaboratorError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    fn analysis(follow_up: bool, relevance: f32, new_search: bool) -> QueryAnalysis {
        QueryAnalysis {
            query_type: QueryType::FollowUp,
            is_follow_up: follow_up,
            context_relevance: relevance,
            requires_new_search: new_search,
            confidence: 0.6,
            reasoning: "r".into(),
            missing_information: vec!["dates".into()],
            follow_up_indicators: vec![],
        }
    }

    #[test]
    fn high_relevance_without_new_search_uses_context() {
        let d = rule_based(&analysis(false, 0.9, false), 0.7);
        assert_eq!(d.strategy, StrategyName::ContextOnly);
        assert!((d.confidence - 0.7).abs() < 1e-6);
        assert!(d.reasoning.contains("High context relevance (0.90)"));
        assert_eq!(d.suggested_actions, vec!["dates"]);
    }

    #[test]
    fn moderate_follow_up_goes_hybrid() {
        let d = rule_based(&analysis(true, 0.5, false), 0.7);
        assert_eq!(d.strategy, StrategyName::Hybrid);
        assert!((d.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn low_relevance_searches_again() {
        let d = rule_based(&analysis(true, 0.1, false), 0.7);
        assert_eq!(d.strategy, StrategyName::NewSearch);
        assert!((d.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn explicit_new_search_overrides_high_relevance() {
        let d = rule_based(&analysis(false, 0.95, true), 0.7);
        assert_eq!(d.strategy, StrategyName::NewSearch);
    }

    #[test]
    fn threshold_is_inclusive_for_context_only() {
        assert_eq!(rule_based(&analysis(true, 0.7, false), 0.7).strategy, StrategyName::ContextOnly);
        assert_eq!(rule_based(&analysis(true, 0.3, true), 0.7).strategy, StrategyName::Hybrid);
    }

    #[tokio::test]
    async fn judge_mode_takes_strategy_from_judge() {
        let judge = Arc::new(FixedJudge(json!({
            "strategy": "new-search-and-context",
            "confidence": 0.55,
            "reasoning": "partial overlap",
            "suggestedActions": []
        })));
        let engine = DecisionEngine::new(DecisionMode::Judge, 0.7, judge);
        // The rule would pick context-only here; the judge is authoritative.
        let d = engine.decide("q", &analysis(false, 0.9, false)).await.unwrap();
        assert_eq!(d.strategy, StrategyName::Hybrid);
        assert_eq!(d.reasoning, "partial overlap");
    }

    #[tokio::test]
    async fn judge_mode_rejects_unknown_strategy() {
        let judge = Arc::new(FixedJudge(json!({"strategy": "guess", "confidence": 0.5, "reasoning": ""})));
        let engine = DecisionEngine::new(DecisionMode::Judge, 0.7, judge);
        let err = engine.decide("q", &analysis(false, 0.9, false)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Decision(_)));
    }

    #[test]
    fn mode_parses() {
        assert_eq!("judge".parse::<DecisionMode>(), Ok(DecisionMode::Judge));
        assert!("vote".parse::<DecisionMode>().is_err());
    }
}
