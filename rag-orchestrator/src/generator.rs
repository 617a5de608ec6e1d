//! Final answer generation: prompt assembly, streaming and citations.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::collaborators::{Generator, TextStream};
use crate::error::{OrchestratorError, Result};
use crate::model::{ConversationTurn, EvidenceNode, Source};
use crate::prompt::{PromptInput, build_prompt, evidence_within_budget};
use crate::schema::{Decision, ResponsePlan};
use crate::sources::{DomainProfile, extract_sources};

/// Streamed answer plus the citations derived from its evidence.
pub struct GeneratedResponse {
    pub stream: TextStream,
    pub sources: Vec<Source>,
}

pub struct ResponseGenerator {
    generator: Arc<dyn Generator>,
    domain: DomainProfile,
    max_prompt_bytes: usize,
}

impl ResponseGenerator {
    pub fn new(generator: Arc<dyn Generator>, domain: DomainProfile, max_prompt_bytes: usize) -> Self {
        Self {
            generator,
            domain,
            max_prompt_bytes,
        }
    }

    pub fn domain(&self) -> &DomainProfile {
        &self.domain
    }

    /// Starts streaming generation. Dropping the returned stream stops it.
    ///
    /// # Errors
    /// [`OrchestratorError::Generation`] if the generator cannot start.
    #[instrument(skip_all, fields(domain = %self.domain.name, nodes = nodes.len()))]
    pub async fn generate(
        &self,
        query: &str,
        nodes: &[EvidenceNode],
        plan: &ResponsePlan,
        decision: Option<&Decision>,
        history: &[ConversationTurn],
    ) -> Result<GeneratedResponse> {
        let prompt = build_prompt(&PromptInput {
            query,
            nodes,
            plan,
            decision,
            history,
            domain: &self.domain,
            max_evidence_bytes: self.max_prompt_bytes,
        });
        let shown = evidence_within_budget(nodes, self.max_prompt_bytes);
        debug!(prompt_bytes = prompt.len(), shown = shown.len(), "generation prompt built");

        // Only passages the model saw can be cited.
        let sources = extract_sources(shown, &self.domain);
        let stream = self
            .generator
            .generate(&prompt)
            .await
            .map_err(OrchestratorError::Generation)?;

        Ok(GeneratedResponse { stream, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use futures::future::BoxFuture;
    use futures::{StreamExt, TryStreamExt, stream};
    use std::sync::Mutex;

    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    impl Generator for Echo {
        fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, std::result::Result<TextStream, CollaboratorError>> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(prompt.to_string());
                let chunks = vec![Ok("Hello ".to_string()), Ok("world".to_string())];
                Ok(stream::iter(chunks).boxed())
            })
        }
    }

    struct Broken;

    impl Generator for Broken {
        fn generate<'a>(&'a self, _: &'a str) -> BoxFuture<'a, std::result::Result<TextStream, CollaboratorError>> {
            Box::pin(async { Err(CollaboratorError::Unavailable("model offline".into())) })
        }
    }

    #[tokio::test]
    async fn streams_text_and_extracts_sources() {
        let echo = Arc::new(Echo { prompts: Mutex::new(vec![]) });
        let g = ResponseGenerator::new(echo.clone(), DomainProfile::generic(), 1000);
        let nodes = vec![EvidenceNode::new("n1", "the passage", 0.9).with_filename("Handbook_9.md")];
        let out = g
            .generate("q?", &nodes, &ResponsePlan::fallback(), None, &[])
            .await
            .unwrap();

        let text: Vec<String> = out.stream.try_collect().await.unwrap();
        assert_eq!(text.concat(), "Hello world");
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].title, "Handbook");
        assert!(echo.prompts.lock().unwrap()[0].contains("the passage"));
    }

    #[tokio::test]
    async fn passages_cut_by_the_budget_are_not_cited() {
        let echo = Arc::new(Echo { prompts: Mutex::new(vec![]) });
        let g = ResponseGenerator::new(echo.clone(), DomainProfile::generic(), 12);
        let nodes = vec![
            EvidenceNode::new("n1", "seen passage", 0.9).with_filename("Seen_1.md"),
            EvidenceNode::new("n2", "unseen passage", 0.8).with_filename("Unseen_2.md"),
        ];
        let out = g
            .generate("q?", &nodes, &ResponsePlan::fallback(), None, &[])
            .await
            .unwrap();

        let ids: Vec<&str> = out.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        assert!(!echo.prompts.lock().unwrap()[0].contains("unseen"));
    }

    #[tokio::test]
    async fn start_failure_is_a_generation_error() {
        let g = ResponseGenerator::new(Arc::new(Broken), DomainProfile::generic(), 1000);
        let err = g
            .generate("q", &[], &ResponsePlan::fallback(), None, &[])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::Generation(_)));
    }
}
