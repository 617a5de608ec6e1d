//! Optional reformulation of the query before fresh retrieval.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analyzer::summarize_turns;
use crate::collaborators::{Judge, judge_typed};
use crate::model::ConversationTurn;
use crate::schema::RewrittenQuery;

pub struct QueryRewriter {
    judge: Arc<dyn Judge>,
}

impl QueryRewriter {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// Returns a standalone search query, or `query` itself if the judge fails.
    pub async fn rewrite(&self, query: &str, recent: &[ConversationTurn]) -> String {
        let prompt = format!(
            "Rewrite the query so it can be searched on its own, resolving references \
             to the previous conversation. Keep the original language and intent.\n\n\
             Previous conversation:\n{}\n\nQuery: {query}",
            summarize_turns(recent)
        );
        match judge_typed::<RewrittenQuery>(self.judge.as_ref(), &prompt).await {
            Ok(r) => {
                let rewritten = r.rewritten_query.trim().to_string();
                debug!(original = query, rewritten = %rewritten, "query rewritten");
                rewritten
            }
            Err(e) => {
                warn!(error = %e, "query rewrite failed, searching with the original query");
                query.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};

    struct FixedJudge(Value);

    impl Judge for FixedJudge {
        fn judge<'a>(&'a self, _: &'a str, _: &'a Value) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[tokio::test]
    async fn uses_rewritten_query() {
        let r = QueryRewriter::new(Arc::new(FixedJudge(json!({"rewrittenQuery": " vacation policy 2024 "}))));
        assert_eq!(r.rewrite("and for 2024?", &[]).await, "vacation policy 2024");
    }

    #[tokio::test]
    async fn blank_rewrite_falls_back_to_original() {
        let r = QueryRewriter::new(Arc::new(FixedJudge(json!({"rewrittenQuery": "   "}))));
        assert_eq!(r.rewrite("and for 2024?", &[]).await, "and for 2024?");
    }
}
