pub mod ollama_service;
pub mod open_ai_service;
pub(crate) mod stream_lines;

use serde_json::Value;

use crate::error_handler::{Result, StructuredError, make_snippet};

/// Parses model output that should be a single JSON object.
///
/// Tolerates Markdown code fences and leading/trailing prose, which some
/// models emit even under a `format`/`response_format` constraint.
pub(crate) fn parse_json_output(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let start = trimmed.find('{').ok_or(StructuredError::NoJson)?;
    let end = trimmed.rfind('}').ok_or(StructuredError::NoJson)?;
    if end < start {
        return Err(StructuredError::NoJson.into());
    }
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| {
        StructuredError::InvalidJson {
            reason: e.to_string(),
            snippet: make_snippet(trimmed),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let v = parse_json_output("```json\n{\"scores\":[{\"index\":0,\"score\":0.9}]}\n```").unwrap();
        assert_eq!(v["scores"][0]["index"], 0);
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_json_output("I cannot answer that.").is_err());
        assert!(parse_json_output("{ not json }").is_err());
    }
}
