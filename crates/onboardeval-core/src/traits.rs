//! Core trait definitions for LLM providers.
//!
//! The trait is implemented by the `onboardeval-providers` crate; the
//! feedback synthesizer only ever sees `dyn LlmProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that write qualitative feedback.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Generate a completion for a prompt.
    ///
    /// Errors should be [`ProviderError`](crate::error::ProviderError) wrapped
    /// in `anyhow` so callers can classify them.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List statically known models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request for a single completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "phi3:latest").
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

/// Response from a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
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
    /// Maximum context window size in tokens (0 when unknown).
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Default system prompt
// ---------------------------------------------------------------------------

/// System prompt used when a request carries none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an experienced HR evaluator reviewing employee onboarding assessments. Respond ONLY with a single valid JSON object. Do not wrap it in markdown and do not add any text before or after it.";

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Locate the JSON object inside a model reply.
///
/// Handles:
/// - ```json fenced blocks (preferred)
/// - Generic ``` blocks
/// - Prose around a bare object
///
/// Returns the slice from the first `{` to the last `}` of the chosen region,
/// or `None` when there is no such pair.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let region = fenced_block(response, "```json")
        .or_else(|| fenced_block(response, "```"))
        .unwrap_or(response);

    let start = region.find('{')?;
    let end = region.rfind('}')?;
    (end > start).then(|| &region[start..=end])
}

/// Content after `opener` up to the next closing fence (or end of input
/// when the block was truncated).
fn fenced_block<'a>(response: &'a str, opener: &str) -> Option<&'a str> {
    let start = response.find(opener)? + opener.len();
    let rest = &response[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(&rest[..end])
}
