//! Lightweight Ollama service for text generation and embeddings.
//!
//! Thin client for the local Ollama API:
//! - `POST {endpoint}/api/generate`   — text generation, blocking or streamed (NDJSON)
//! - `POST {endpoint}/api/generate` with `format` — schema-constrained JSON output
//! - `POST {endpoint}/api/embeddings` — embeddings retrieval
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures
//! that the selected provider is [`LlmProvider::Ollama`].

use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, Result, make_snippet,
    },
    services::{
        parse_json_output,
        stream_lines::{LineEvent, text_stream},
    },
};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with
/// a configurable timeout.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not `Ollama`
    /// - `InvalidEndpoint` if `cfg.endpoint` is not http(s)
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(ProviderError::new(Provider::Ollama, ProviderErrorKind::InvalidProvider).into());
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        let base = endpoint.trim_end_matches('/').to_string();
        let url_generate = format!("{base}/api/generate");
        let url_embeddings = format!("{base}/api/embeddings");

        info!(model = %cfg.model, endpoint = %cfg.endpoint, "OllamaService initialized");

        Ok(Self {
            client,
            cfg,
            url_generate,
            url_embeddings,
        })
    }

    /// Streams the generation as text deltas.
    ///
    /// Each NDJSON line carries `{response, done}`; the stream ends at
    /// `done=true`. Dropping the stream closes the connection, which makes
    /// Ollama stop generating.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate_stream(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt, system, true, None);
        debug!(prompt_len = prompt.len(), "POST {} (stream)", self.url_generate);

        let resp = self.client.post(&self.url_generate).json(&body).send().await?;
        let resp = self.check_status(resp, &self.url_generate).await?;
        Ok(text_stream(Box::pin(resp.bytes_stream()), parse_ndjson_line))
    }

    /// Asks for a JSON object conforming to `schema` (Ollama `format`).
    ///
    /// The returned value is parsed JSON only; callers validate semantics.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt, None, false, Some(schema));
        let out: GenerateResponse = self.post_json(&self.url_generate, &body).await?;
        parse_json_output(&out.response)
    }

    /// Retrieves embeddings via `/api/embeddings`.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };
        let out: EmbeddingsResponse = self.post_json(&self.url_embeddings, &body).await?;
        if out.embedding.is_empty() {
            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::Decode("empty embedding vector".into()),
            )
            .into());
        }
        Ok(out.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let started = Instant::now();
        debug!("POST {url}");
        let resp = self.client.post(url).json(body).send().await?;
        let resp = self.check_status(resp, url).await?;

        let out = resp.json::<T>().await.map_err(|e| {
            error!(error = %e, %url, latency_ms = started.elapsed().as_millis(), "decode failed");
            AiLlmError::from(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::Decode(format!("serde error: {e}")),
            ))
        })?;
        debug!(%url, latency_ms = started.elapsed().as_millis(), "request completed");
        Ok(out)
    }

    async fn check_status(&self, resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);
        error!(%status, %url, %snippet, model = %self.cfg.model, "Ollama returned non-success status");
        Err(ProviderError::new(
            Provider::Ollama,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            }),
        )
        .into())
    }
}

/// Decodes one NDJSON line of a streamed `/api/generate` response.
fn parse_ndjson_line(line: &str) -> Result<LineEvent> {
    let chunk: StreamChunk = serde_json::from_str(line).map_err(|e| {
        ProviderError::new(
            Provider::Ollama,
            ProviderErrorKind::Decode(format!("bad stream line: {e}")),
        )
    })?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::new(Provider::Ollama, ProviderErrorKind::Decode(err)).into());
    }
    if chunk.done {
        return Ok(match chunk.response {
            Some(t) if !t.is_empty() => LineEvent::Text(t),
            _ => LineEvent::Done,
        });
    }
    Ok(match chunk.response {
        Some(t) if !t.is_empty() => LineEvent::Text(t),
        _ => LineEvent::Skip,
    })
}

/* ==========================
HTTP payloads & options
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

impl<'a> GenerateRequest<'a> {
    fn from_cfg(
        cfg: &'a LlmModelConfig,
        prompt: &'a str,
        system: Option<&'a str>,
        stream: bool,
        format: Option<&'a Value>,
    ) -> Self {
        let options = GenerateOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            prompt,
            system,
            stream,
            format,
            options: Some(options),
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_lines_map_to_events() {
        assert_eq!(
            parse_ndjson_line(r#"{"response":"Hel","done":false}"#).ok(),
            Some(LineEvent::Text("Hel".into()))
        );
        assert_eq!(
            parse_ndjson_line(r#"{"response":"","done":false}"#).ok(),
            Some(LineEvent::Skip)
        );
        assert_eq!(
            parse_ndjson_line(r#"{"response":"","done":true,"total_duration":1}"#).ok(),
            Some(LineEvent::Done)
        );
    }

    #[test]
    fn ndjson_error_line_fails() {
        assert!(parse_ndjson_line(r#"{"error":"model not found"}"#).is_err());
        assert!(parse_ndjson_line("not json").is_err());
    }

    #[test]
    fn rejects_foreign_provider() {
        let cfg = LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "m".into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: None,
        };
        assert!(matches!(
            OllamaService::new(cfg),
            Err(AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::InvalidProvider,
                ..
            }))
        ));
    }

    #[test]
    fn structured_request_carries_schema() {
        let cfg = LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "m".into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: Some(64),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: None,
        };
        let schema = serde_json::json!({"type": "object"});
        let body = GenerateRequest::from_cfg(&cfg, "p", None, false, Some(&schema));
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["format"]["type"], "object");
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["num_predict"], 64);
        assert!(v.get("system").is_none());
    }
}
