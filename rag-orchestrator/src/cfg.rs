//! Runtime configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::context::{ContextManager, DedupPolicy};
use crate::conversation::StoreLimits;
use crate::decision::DecisionMode;
use crate::error::{OrchestratorError, Result};
use crate::rerank::{RerankOptions, RerankStrategy};
use crate::sources::DomainProfile;

/// Config bag for the engine. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    // Retrieval and rerank knobs
    pub retrieval_top_k: usize,
    pub rerank: RerankOptions,

    // Decision
    pub decision_mode: DecisionMode,
    pub context_threshold: f32,

    // Prior-turn context
    pub context: ContextManager,
    pub max_context_nodes: usize,
    pub history_window: usize,

    pub query_rewrite: bool,
    pub max_prompt_bytes: usize,
    pub store: StoreLimits,
    pub domain: DomainProfile,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: 20,
            rerank: RerankOptions {
                top_k: Some(10),
                ..Default::default()
            },
            decision_mode: DecisionMode::Rule,
            context_threshold: 0.7,
            context: ContextManager::default(),
            max_context_nodes: 8,
            history_window: 5,
            query_rewrite: false,
            max_prompt_bytes: 24_000,
            store: StoreLimits::default(),
            domain: DomainProfile::generic(),
        }
    }
}

impl OrchestratorConfig {
    /// Build from environment variables with defaults, then validate.
    ///
    /// Numeric knobs fall back to their default when unparsable; enum knobs
    /// (`RERANK_STRATEGY`, `DECISION_MODE`, `DEDUP_POLICY`, `DOMAIN`) fail.
    ///
    /// # Errors
    /// [`OrchestratorError::Config`] on an unknown enum value or a value out of range.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        let rerank_top_k: usize = parse("RERANK_TOP_K", 10);
        let mut domain: DomainProfile = parse_enum("DOMAIN", "generic")?;
        if let Ok(template) = std::env::var("SOURCE_URL_TEMPLATE") {
            domain = domain.with_url_template(template);
        }

        let cfg = Self {
            retrieval_top_k: parse("RAG_TOP_K", d.retrieval_top_k),
            rerank: RerankOptions {
                strategy: parse_enum::<RerankStrategy>("RERANK_STRATEGY", "hybrid")?,
                top_k: (rerank_top_k > 0).then_some(rerank_top_k),
                semantic_weight: parse("RERANK_SEMANTIC_WEIGHT", d.rerank.semantic_weight),
                threshold: parse("RERANK_THRESHOLD", d.rerank.threshold),
            },

            decision_mode: parse_enum("DECISION_MODE", "rule")?,
            context_threshold: parse("CONTEXT_THRESHOLD", d.context_threshold),

            context: ContextManager {
                context_boost: parse("CONTEXT_BOOST", d.context.context_boost),
                recency_boost: env("RECENCY_BOOST", "true") == "true",
                dedup: parse_enum::<DedupPolicy>("DEDUP_POLICY", "first-seen")?,
            },
            max_context_nodes: parse("MAX_CONTEXT_NODES", d.max_context_nodes),
            history_window: parse("HISTORY_WINDOW", d.history_window),

            query_rewrite: env("QUERY_REWRITE", "false") == "true",
            max_prompt_bytes: parse("MAX_PROMPT_BYTES", d.max_prompt_bytes),
            store: StoreLimits {
                max_conversations: parse("STORE_MAX_CONVERSATIONS", d.store.max_conversations),
                ttl: Duration::from_secs(parse("STORE_TTL_SECS", d.store.ttl.as_secs())),
            },
            domain,
        };

        cfg.validate()?;
        debug!(?cfg, "orchestrator config loaded");
        Ok(cfg)
    }

    /// Rejects values outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        unit("RERANK_SEMANTIC_WEIGHT", self.rerank.semantic_weight)?;
        unit("RERANK_THRESHOLD", self.rerank.threshold)?;
        unit("CONTEXT_THRESHOLD", self.context_threshold)?;
        if !(self.context.context_boost >= 1.0) {
            return Err(OrchestratorError::Config(format!(
                "CONTEXT_BOOST must be >= 1, got {}",
                self.context.context_boost
            )));
        }
        for (name, v) in [
            ("RAG_TOP_K", self.retrieval_top_k),
            ("MAX_CONTEXT_NODES", self.max_context_nodes),
            ("MAX_PROMPT_BYTES", self.max_prompt_bytes),
            ("STORE_MAX_CONVERSATIONS", self.store.max_conversations),
        ] {
            if v == 0 {
                return Err(OrchestratorError::Config(format!("{name} must be positive")));
            }
        }
        self.domain.validate().map_err(OrchestratorError::Config)
    }
}

fn unit(name: &str, v: f32) -> Result<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(OrchestratorError::Config(format!("{name} must be in [0, 1], got {v}")))
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k).unwrap_or_else(|_| dflt.to_string())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}

fn parse_enum<T: FromStr<Err = String>>(k: &str, dflt: &str) -> Result<T> {
    env(k, dflt)
        .parse()
        .map_err(|e: String| OrchestratorError::Config(format!("{k}: {e}")))
}
