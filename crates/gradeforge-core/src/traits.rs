//! Text-generation backend trait and response helpers.
//!
//! Implemented by the `gradeforge-providers` crate; tests inject scripted
//! backends through the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A text-generation backend. Output is free-form text with no schema guarantee.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Human-readable backend name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send a prompt and return the generated text.
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, BackendError>;

    /// List models this backend knows about.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// A single prompt sent to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Model identifier.
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Text returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// The raw generated text.
    pub text: String,
    /// Model that actually answered.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Default system prompt
// ---------------------------------------------------------------------------

/// Default system prompt for content generation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert educational content designer \
and grader. Follow the requested output format exactly.";

// ---------------------------------------------------------------------------
// Markdown JSON extraction
// ---------------------------------------------------------------------------

/// Extract a JSON payload from a markdown-formatted response.
///
/// Handles:
/// - ```json``` blocks (the first one wins)
/// - Generic ``` blocks (if no json-tagged block is found)
/// - Raw text with no markdown blocks (returned trimmed)
pub fn extract_json_from_markdown(response: &str) -> &str {
    let mut json_block: Option<(usize, usize)> = None;
    let mut generic_block: Option<(usize, usize)> = None;
    let mut open: Option<(usize, bool, bool)> = None;
    let mut offset = 0usize;

    for line in response.split_inclusive('\n') {
        let trimmed = line.trim();
        let line_start = offset;
        offset += line.len();

        match open {
            None if trimmed.starts_with("```") => {
                let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
                open = Some((offset, lang == "json", lang.is_empty()));
            }
            Some((start, is_json, is_generic)) if trimmed == "```" => {
                open = None;
                if is_json && json_block.is_none() {
                    json_block = Some((start, line_start));
                } else if is_generic && generic_block.is_none() {
                    generic_block = Some((start, line_start));
                }
            }
            _ => {}
        }
    }

    // Truncated (unclosed) block: take everything after the fence
    if let Some((start, is_json, is_generic)) = open {
        if is_json && json_block.is_none() {
            json_block = Some((start, response.len()));
        } else if is_generic && generic_block.is_none() {
            generic_block = Some((start, response.len()));
        }
    }

    match json_block.or(generic_block) {
        Some((start, end)) => response[start..end].trim(),
        None => response.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_block() {
        let input = "Here you go:\n\n```json\n{\"questions\": []}\n```\n\nEnjoy!";
        assert_eq!(extract_json_from_markdown(input), "{\"questions\": []}");
    }

    #[test]
    fn extract_generic_block_fallback() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_from_markdown(input), "{\"a\": 1}");
    }

    #[test]
    fn extract_prefers_json_over_generic() {
        let input = "```\nnot this\n```\n\n```json\n{\"b\": 2}\n```\n";
        assert_eq!(extract_json_from_markdown(input), "{\"b\": 2}");
    }

    #[test]
    fn extract_no_blocks_returns_trimmed_raw() {
        let input = "  {\"c\": 3}\n";
        assert_eq!(extract_json_from_markdown(input), "{\"c\": 3}");
    }

    #[test]
    fn extract_truncated_unclosed_block() {
        let input = "```json\n{\"questions\": [\n  {\"question\": \"x\"}";
        let extracted = extract_json_from_markdown(input);
        assert!(extracted.starts_with("{\"questions\""), "got: {extracted}");
    }

    #[test]
    fn extract_ignores_other_languages() {
        let input = "```python\nprint(1)\n```\n\n```json\n[1]\n```";
        assert_eq!(extract_json_from_markdown(input), "[1]");
    }
}
