//! Provider-agnostic LLM access for the orchestrator.
//!
//! Exposes [`LlmServiceProfiles`] (fast/slow/embedding) backed by Ollama or
//! OpenAI clients, plus env-driven config constructors.

pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;

pub use config::default_config::configs_from_env;
pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{AiLlmError, Result};
pub use service_profiles::LlmServiceProfiles;
