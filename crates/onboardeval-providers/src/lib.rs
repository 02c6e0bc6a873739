//! onboardeval-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for OpenAI-compatible APIs and Ollama,
//! plus a scriptable mock, and loads the `onboardeval.toml` configuration.

pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, OnboardConfig, ProviderConfig};
pub use error::ProviderError;
