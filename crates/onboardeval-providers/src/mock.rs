//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use onboardeval_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage,
};

use crate::error::ProviderError;

/// How the mock answers every call.
#[derive(Debug, Clone)]
enum Behavior {
    Respond,
    /// Transient failure (network).
    Fail,
    /// Permanent failure (bad credentials).
    Unauthorized,
    /// Sleep this long before responding.
    Hang(Duration),
}

/// A mock LLM provider for driving the grading engine without real API calls.
///
/// Returns configurable responses based on prompt content matching, or fails
/// or stalls on demand.
pub struct MockProvider {
    /// Map of prompt substring → response text.
    responses: HashMap<String, String>,
    /// Default response if no prompt matches.
    default_response: String,
    behavior: Behavior,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with the given prompt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "{}".to_string(),
            behavior: Behavior::Respond,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Every call fails with a network error.
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::new(HashMap::new())
        }
    }

    /// Every call fails with an authentication error.
    pub fn unauthorized() -> Self {
        Self {
            behavior: Behavior::Unauthorized,
            ..Self::new(HashMap::new())
        }
    }

    /// Every call sleeps for `delay` before returning `response`.
    pub fn hanging(delay: Duration, response: &str) -> Self {
        Self {
            behavior: Behavior::Hang(delay),
            ..Self::with_fixed_response(response)
        }
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        match &self.behavior {
            Behavior::Respond => {}
            Behavior::Fail => {
                return Err(ProviderError::NetworkError("mock provider offline".into()).into())
            }
            Behavior::Unauthorized => {
                return Err(ProviderError::AuthenticationFailed("mock key rejected".into()).into())
            }
            Behavior::Hang(delay) => tokio::time::sleep(*delay).await,
        }

        // Find a matching response based on prompt content
        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // Rough estimate
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage::new(prompt_tokens, completion_tokens),
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response(r#"{"overall_comment": "ok"}"#);

        let response = provider.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, r#"{"overall_comment": "ok"}"#);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let mut responses = HashMap::new();
        responses.insert("Question:".to_string(), "Because of ownership.".to_string());
        responses.insert("ASSIGNMENT".to_string(), r#"{"score": 88}"#.to_string());

        let provider = MockProvider::new(responses);

        let resp = provider
            .generate(&request("Question: What moves a value?"))
            .await
            .unwrap();
        assert!(resp.content.contains("ownership"));

        let resp = provider
            .generate(&request("ASSIGNMENT: Architecture write-up"))
            .await
            .unwrap();
        assert!(resp.content.contains("88"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn failure_modes_are_classified() {
        let err = MockProvider::failing()
            .generate(&request("x"))
            .await
            .unwrap_err();
        let classified = err.downcast_ref::<ProviderError>().unwrap();
        assert!(!classified.is_permanent());

        let err = MockProvider::unauthorized()
            .generate(&request("x"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().unwrap().is_permanent());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_responds_after_delay() {
        let provider = MockProvider::hanging(Duration::from_secs(30), "late");
        let started = tokio::time::Instant::now();
        let response = provider.generate(&request("x")).await.unwrap();
        assert_eq!(response.content, "late");
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
