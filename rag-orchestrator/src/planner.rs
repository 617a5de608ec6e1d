//! Response shape planning. Never fails: a judge error yields the fallback plan.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::collaborators::{Judge, judge_typed};
use crate::schema::{Decision, QueryAnalysis, ResponsePlan};

pub struct ResponsePlanner {
    judge: Arc<dyn Judge>,
}

impl ResponsePlanner {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    #[instrument(skip_all)]
    pub async fn plan(&self, query: &str, analysis: &QueryAnalysis, decision: &Decision) -> ResponsePlan {
        let prompt = plan_prompt(query, analysis, decision);
        match judge_typed::<ResponsePlan>(self.judge.as_ref(), &prompt).await {
            Ok(plan) => {
                info!(
                    format = ?plan.format_type,
                    sourcing = ?plan.sourcing_strategy,
                    citations = plan.citation_required,
                    "response planned"
                );
                plan
            }
            Err(e) => {
                warn!(error = %e, "response planning failed, using fallback plan");
                ResponsePlan::fallback()
            }
        }
    }
}

fn plan_prompt(query: &str, analysis: &QueryAnalysis, decision: &Decision) -> String {
    format!(
        "Plan the structure of the answer to the query.\n\
         Pick a format (text, list, summary, detailed, comparison), a sourcing strategy \
         (direct-quote, synthesis, hybrid), whether citations are required, and the main \
         points the answer must cover.\n\n\
         Query: {query}\n\
         Query type: {:?}\n\
         Evidence strategy: {}\n\
         Decision reasoning: {}",
        analysis.query_type, decision.strategy, decision.reasoning
    )
}
