//! Typed structured judgments and their JSON schemas.
//!
//! Every structured call goes through [`Judgement`]: the type supplies the
//! schema sent to the judge and a range check run after deserialization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

/// A typed result of a structured-judgment call.
pub trait Judgement: DeserializeOwned + Send {
    /// Short name used in error messages.
    const NAME: &'static str;

    /// JSON schema handed to the judge collaborator.
    fn schema() -> Value;

    /// Semantic checks serde cannot express (numeric ranges, indices).
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn check_unit(field: &str, v: f32) -> Result<(), String> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(format!("{field} must be in [0, 1], got {v}"))
    }
}

/* ------------------------------------------------------------------------- */
/* Strategy names                                                            */
/* ------------------------------------------------------------------------- */

/// The one vocabulary shared by the decision engine and the strategy router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyName {
    ContextOnly,
    #[serde(alias = "new")]
    NewSearch,
    #[serde(alias = "new-search-and-context")]
    Hybrid,
}

impl StrategyName {
    pub const ALL: [StrategyName; 3] = [
        StrategyName::ContextOnly,
        StrategyName::NewSearch,
        StrategyName::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyName::ContextOnly => "context-only",
            StrategyName::NewSearch => "new-search",
            StrategyName::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "context-only" => Ok(StrategyName::ContextOnly),
            "new-search" | "new" => Ok(StrategyName::NewSearch),
            "hybrid" | "new-search-and-context" => Ok(StrategyName::Hybrid),
            other => Err(format!("unknown strategy name: {other}")),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Query analysis                                                            */
/* ------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    Clarification,
    FollowUp,
    NewTopic,
    Elaboration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub is_follow_up: bool,
    pub context_relevance: f32,
    pub requires_new_search: bool,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub follow_up_indicators: Vec<String>,
}

impl Judgement for QueryAnalysis {
    const NAME: &'static str = "query analysis";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "queryType": {
                    "type": "string",
                    "enum": ["clarification", "follow-up", "new-topic", "elaboration"],
                    "description": "Kind of query relative to the conversation."
                },
                "isFollowUp": { "type": "boolean" },
                "contextRelevance": {
                    "type": "number", "minimum": 0, "maximum": 1,
                    "description": "How well previous context covers this query."
                },
                "requiresNewSearch": { "type": "boolean" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "reasoning": { "type": "string" },
                "missingInformation": { "type": "array", "items": { "type": "string" } },
                "followUpIndicators": { "type": "array", "items": { "type": "string" } }
            },
            "required": [
                "queryType", "isFollowUp", "contextRelevance", "requiresNewSearch",
                "confidence", "reasoning", "missingInformation"
            ]
        })
    }

    fn validate(&self) -> Result<(), String> {
        check_unit("contextRelevance", self.context_relevance)?;
        check_unit("confidence", self.confidence)
    }
}

/* ------------------------------------------------------------------------- */
/* Decision                                                                  */
/* ------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub strategy: StrategyName,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

impl Judgement for Decision {
    const NAME: &'static str = "decision";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "strategy": {
                    "type": "string",
                    "enum": StrategyName::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                    "description": "context-only: answer from previous context; new-search: fresh retrieval; hybrid: both."
                },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "reasoning": { "type": "string" },
                "suggestedActions": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["strategy", "confidence", "reasoning", "suggestedActions"]
        })
    }

    fn validate(&self) -> Result<(), String> {
        check_unit("confidence", self.confidence)
    }
}

/* ------------------------------------------------------------------------- */
/* Response plan                                                             */
/* ------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatType {
    List,
    Summary,
    Detailed,
    Comparison,
    /// Also what any unrecognized format reads as.
    #[default]
    #[serde(other)]
    Text,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourcingStrategy {
    DirectQuote,
    Synthesis,
    #[default]
    Hybrid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePlan {
    pub required_components: Vec<String>,
    pub sourcing_strategy: SourcingStrategy,
    pub format_type: FormatType,
    pub citation_required: bool,
    pub main_points: Vec<String>,
    #[serde(default)]
    pub contextual_enhancements: Vec<String>,
}

impl ResponsePlan {
    /// Plan used whenever planning fails.
    pub fn fallback() -> Self {
        Self {
            required_components: vec!["main-answer".into(), "sources".into()],
            sourcing_strategy: SourcingStrategy::Hybrid,
            format_type: FormatType::Text,
            citation_required: true,
            main_points: vec!["direct-answer".into()],
            contextual_enhancements: Vec::new(),
        }
    }
}

impl Judgement for ResponsePlan {
    const NAME: &'static str = "response plan";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "requiredComponents": { "type": "array", "items": { "type": "string" } },
                "sourcingStrategy": {
                    "type": "string",
                    "enum": ["direct-quote", "synthesis", "hybrid"]
                },
                "formatType": {
                    "type": "string",
                    "enum": ["text", "list", "summary", "detailed", "comparison"]
                },
                "citationRequired": { "type": "boolean" },
                "mainPoints": { "type": "array", "items": { "type": "string" } },
                "contextualEnhancements": { "type": "array", "items": { "type": "string" } }
            },
            "required": [
                "requiredComponents", "sourcingStrategy", "formatType",
                "citationRequired", "mainPoints"
            ]
        })
    }
}

/* ------------------------------------------------------------------------- */
/* Rerank scores                                                             */
/* ------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexScore {
    pub index: usize,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankScores {
    pub scores: Vec<IndexScore>,
}

impl RerankScores {
    /// Checks that every candidate index `0..n` is scored exactly once.
    pub fn check_coverage(&self, n: usize) -> Result<(), String> {
        let mut seen = vec![false; n];
        for s in &self.scores {
            match seen.get_mut(s.index) {
                None => return Err(format!("index {} out of range 0..{n}", s.index)),
                Some(true) => return Err(format!("index {} scored twice", s.index)),
                Some(slot) => *slot = true,
            }
        }
        match seen.iter().position(|s| !s) {
            Some(missing) => Err(format!("index {missing} has no score")),
            None => Ok(()),
        }
    }
}

impl Judgement for RerankScores {
    const NAME: &'static str = "rerank scores";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "scores": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": { "type": "integer", "minimum": 0 },
                            "score": { "type": "number", "minimum": 0, "maximum": 1 }
                        },
                        "required": ["index", "score"]
                    }
                }
            },
            "required": ["scores"]
        })
    }

    fn validate(&self) -> Result<(), String> {
        self.scores
            .iter()
            .try_for_each(|s| check_unit("score", s.score))
    }
}

/* ------------------------------------------------------------------------- */
/* Rewritten query                                                           */
/* ------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewrittenQuery {
    pub rewritten_query: String,
}

impl Judgement for RewrittenQuery {
    const NAME: &'static str = "rewritten query";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": { "rewrittenQuery": { "type": "string" } },
            "required": ["rewrittenQuery"]
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.rewritten_query.trim().is_empty() {
            Err("rewrittenQuery is empty".into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_accept_legacy_aliases() {
        let d: Decision = serde_json::from_value(json!({
            "strategy": "new-search-and-context",
            "confidence": 0.4,
            "reasoning": "r"
        }))
        .unwrap();
        assert_eq!(d.strategy, StrategyName::Hybrid);
        assert_eq!("new".parse::<StrategyName>(), Ok(StrategyName::NewSearch));
        assert_eq!(StrategyName::ContextOnly.to_string(), "context-only");
        assert!("fresh".parse::<StrategyName>().is_err());
    }

    #[test]
    fn analysis_out_of_range_fails_validation() {
        let a: QueryAnalysis = serde_json::from_value(json!({
            "queryType": "follow-up",
            "isFollowUp": true,
            "contextRelevance": 1.4,
            "requiresNewSearch": false,
            "confidence": 0.9,
            "reasoning": "r",
            "missingInformation": []
        }))
        .unwrap();
        assert!(a.validate().is_err());
    }

    #[test]
    fn unknown_format_type_reads_as_text() {
        let p: ResponsePlan = serde_json::from_value(json!({
            "requiredComponents": [],
            "sourcingStrategy": "synthesis",
            "formatType": "analytical",
            "citationRequired": false,
            "mainPoints": []
        }))
        .unwrap();
        assert_eq!(p.format_type, FormatType::Text);

        let known: FormatType = serde_json::from_value(json!("comparison")).unwrap();
        assert_eq!(known, FormatType::Comparison);
        assert_eq!(FormatType::default(), FormatType::Text);
    }

    #[test]
    fn rerank_coverage_requires_every_index_once() {
        let scores = |idx: &[usize]| RerankScores {
            scores: idx.iter().map(|&index| IndexScore { index, score: 0.5 }).collect(),
        };
        assert!(scores(&[2, 0, 1]).check_coverage(3).is_ok());
        assert!(scores(&[0, 1]).check_coverage(3).is_err());
        assert!(scores(&[0, 0, 1]).check_coverage(3).is_err());
        assert!(scores(&[0, 1, 3]).check_coverage(3).is_err());
    }

    #[test]
    fn fallback_plan_matches_fixed_shape() {
        let p = ResponsePlan::fallback();
        assert_eq!(p.required_components, vec!["main-answer", "sources"]);
        assert_eq!(p.sourcing_strategy, SourcingStrategy::Hybrid);
        assert_eq!(p.format_type, FormatType::Text);
        assert!(p.citation_required);
        assert_eq!(p.main_points, vec!["direct-answer"]);
    }
}
