//! Default LLM configs loaded strictly from environment variables.
//!
//! Configs are grouped by provider and role:
//!
//! - **Slow**      → high-quality model (answer generation)
//! - **Fast**      → cheaper model (structured judgments, rewriting)
//! - **Embedding** → embedding generator
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND`       = `ollama` (default) or `openai`
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`                = slow model (mandatory)
//! - `OLLAMA_MODEL_FAST`           = fast model (falls back to `OLLAMA_MODEL`)
//! - `EMBEDDING_MODEL`             = embedding model (mandatory)
//!
//! OpenAI:
//! - `OPENAI_API_KEY`         = API key (mandatory)
//! - `OPENAI_BASE_URL`        = endpoint, default `https://api.openai.com`
//! - `OPENAI_MODEL`           = slow model, default `gpt-4o`
//! - `OPENAI_MODEL_FAST`      = fast model, default `gpt-4o-mini`
//! - `OPENAI_EMBEDDING_MODEL` = default `text-embedding-3-small`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt_u32, must_env, opt_env},
};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";

/// The three profiles, in `(fast, slow, embedding)` order.
pub type ProfileConfigs = (LlmModelConfig, LlmModelConfig, LlmModelConfig);

/// Builds all three profiles for the provider named by `LLM_KIND`.
///
/// # Errors
/// [`ConfigError::UnsupportedProvider`] for unknown kinds, plus whatever
/// the provider-specific constructors report.
pub fn configs_from_env() -> Result<ProfileConfigs, AiLlmError> {
    let kind = opt_env("LLM_KIND").unwrap_or_else(|| "ollama".to_string());
    let provider: LlmProvider = kind.parse()?;
    let configs = match provider {
        LlmProvider::Ollama => (
            config_ollama_fast()?,
            config_ollama_slow()?,
            config_ollama_embedding()?,
        ),
        LlmProvider::OpenAI => (
            config_openai_fast()?,
            config_openai_slow()?,
            config_openai_embedding()?,
        ),
    };
    configs.0.validate()?;
    configs.1.validate()?;
    configs.2.validate()?;
    Ok(configs)
}

/// Resolves the Ollama endpoint strictly from environment.
///
/// `OLLAMA_URL` wins; otherwise `OLLAMA_PORT` maps to `http://localhost:{port}`.
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Some(url) = opt_env("OLLAMA_URL") {
        return Ok(url);
    }
    if let Some(port) = opt_env("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    Err(AiLlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

/// Slow/quality Ollama model (`OLLAMA_MODEL`).
pub fn config_ollama_slow() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: must_env("OLLAMA_MODEL")?,
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(600),
    })
}

/// Fast Ollama model used for structured judgments.
///
/// Low temperature: judgments must be stable across calls.
pub fn config_ollama_fast() -> Result<LlmModelConfig, AiLlmError> {
    let model = match opt_env("OLLAMA_MODEL_FAST") {
        Some(m) => m,
        None => must_env("OLLAMA_MODEL")?,
    };
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.1),
        top_p: Some(0.9),
        timeout_secs: Some(120),
    })
}

/// Embedding Ollama model (`EMBEDDING_MODEL`).
pub fn config_ollama_embedding() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: must_env("EMBEDDING_MODEL")?,
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}

fn openai_base(model_var: &'static str, default_model: &str) -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: opt_env(model_var).unwrap_or_else(|| default_model.to_string()),
        endpoint: opt_env("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string()),
        api_key: Some(must_env("OPENAI_API_KEY")?),
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: None,
        top_p: None,
        timeout_secs: Some(120),
    })
}

pub fn config_openai_slow() -> Result<LlmModelConfig, AiLlmError> {
    let mut cfg = openai_base("OPENAI_MODEL", "gpt-4o")?;
    cfg.temperature = Some(0.2);
    cfg.timeout_secs = Some(300);
    Ok(cfg)
}

pub fn config_openai_fast() -> Result<LlmModelConfig, AiLlmError> {
    let mut cfg = openai_base("OPENAI_MODEL_FAST", "gpt-4o-mini")?;
    cfg.temperature = Some(0.1);
    Ok(cfg)
}

pub fn config_openai_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let mut cfg = openai_base("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small")?;
    cfg.max_tokens = None;
    cfg.timeout_secs = Some(30);
    Ok(cfg)
}
