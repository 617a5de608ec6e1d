//! Query classification against a bounded window of prior turns.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::collaborators::{Judge, judge_typed};
use crate::error::{OrchestratorError, Result};
use crate::model::{ConversationHistory, ConversationTurn};
use crate::prompt::safe_truncate;
use crate::schema::QueryAnalysis;

const RESPONSE_PREVIEW_CHARS: usize = 300;
const SOURCE_PREVIEW_CHARS: usize = 200;

pub struct QueryAnalyzer {
    judge: Arc<dyn Judge>,
    history_window: usize,
}

impl QueryAnalyzer {
    pub fn new(judge: Arc<dyn Judge>, history_window: usize) -> Self {
        Self { judge, history_window }
    }

    /// Classifies `query` relative to the recent turns of `history`.
    ///
    /// # Errors
    /// [`OrchestratorError::Analysis`] on any judge failure. There is no
    /// local fallback; the turn is aborted.
    #[instrument(skip_all, fields(window = self.history_window))]
    pub async fn analyze(&self, query: &str, history: Option<&ConversationHistory>) -> Result<QueryAnalysis> {
        let turns = history.map(|h| h.recent(self.history_window)).unwrap_or_default();
        let prompt = analysis_prompt(query, turns);

        let analysis: QueryAnalysis = judge_typed(self.judge.as_ref(), &prompt)
            .await
            .map_err(OrchestratorError::Analysis)?;

        info!(
            query_type = ?analysis.query_type,
            follow_up = analysis.is_follow_up,
            relevance = analysis.context_relevance,
            requires_new_search = analysis.requires_new_search,
            confidence = analysis.confidence,
            "query analyzed"
        );
        Ok(analysis)
    }
}

/// Compact textual summary of prior turns for the analysis prompt.
pub fn summarize_turns(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "No previous context available.".to_string();
    }
    turns
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let sources = t
                .nodes
                .iter()
                .map(|n| safe_truncate(n.content(), SOURCE_PREVIEW_CHARS))
                .collect::<Vec<_>>()
                .join(" | ");
            format!(
                "Turn {}:\nQuery: {}\nResponse: {}\nSources: {}",
                i + 1,
                t.query,
                safe_truncate(&t.response, RESPONSE_PREVIEW_CHARS),
                sources
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn analysis_prompt(query: &str, turns: &[ConversationTurn]) -> String {
    format!(
        "Analyze the current query in the context of the conversation so far.\n\
         Decide whether it is a follow-up, how well the previous context covers it \
         (contextRelevance from 0 to 1), whether a new document search is required, \
         and what information is missing.\n\n\
         Previous conversation:\n{}\n\n\
         Current query: {query}",
        summarize_turns(turns)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::model::EvidenceNode;
    use crate::schema::QueryType;
    use chrono::Utc;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Recording {
        reply: std::result::Result<Value, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Judge for Recording {
        fn judge<'a>(&'a self, prompt: &'a str, _: &'a Value) -> BoxFuture<'a, std::result::Result<Value, CollaboratorError>> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(prompt.to_string());
                self.reply.clone().map_err(CollaboratorError::Unavailable)
            })
        }
    }

    fn turn(i: usize, response: &str) -> ConversationTurn {
        ConversationTurn {
            id: format!("c-{i}"),
            timestamp: Utc::now(),
            query: format!("question {i}"),
            response: response.to_string(),
            nodes: vec![EvidenceNode::new("n", "x".repeat(500), 0.5)],
            sources: vec![],
        }
    }

    #[test]
    fn summary_truncates_response_and_sources() {
        let s = summarize_turns(&[turn(0, &"r".repeat(400))]);
        assert!(s.starts_with("Turn 1:\nQuery: question 0"));
        assert!(s.contains(&format!("Response: {}\n", "r".repeat(300))));
        assert!(s.contains(&format!("Sources: {}", "x".repeat(200))));
        assert!(!s.contains(&"x".repeat(201)));
    }

    #[test]
    fn empty_history_has_placeholder() {
        assert_eq!(summarize_turns(&[]), "No previous context available.");
    }

    #[tokio::test]
    async fn analysis_uses_only_the_history_window() {
        let judge = Arc::new(Recording {
            reply: Ok(json!({
                "queryType": "follow-up",
                "isFollowUp": true,
                "contextRelevance": 0.6,
                "requiresNewSearch": false,
                "confidence": 0.7,
                "reasoning": "refers to previous answer",
                "missingInformation": []
            })),
            prompts: Mutex::new(vec![]),
        });
        let mut h = ConversationHistory::new("c", Utc::now());
        for i in 0..4 {
            h.push(turn(i, "answer"));
        }
        let analyzer = QueryAnalyzer::new(judge.clone(), 2);
        let a = analyzer.analyze("and then?", Some(&h)).await.unwrap();
        assert_eq!(a.query_type, QueryType::FollowUp);

        let prompt = judge.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("question 3"));
        assert!(prompt.contains("question 2"));
        assert!(!prompt.contains("question 1"));
        assert!(prompt.contains("Current query: and then?"));
    }

    #[tokio::test]
    async fn judge_failure_aborts_with_analysis_error() {
        let judge = Arc::new(Recording {
            reply: Err("timeout".into()),
            prompts: Mutex::new(vec![]),
        });
        let err = QueryAnalyzer::new(judge, 5).analyze("q", None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Analysis(_)));
    }
}
