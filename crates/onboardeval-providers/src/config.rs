//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use onboardeval_core::config::EngineConfig;
use onboardeval_core::engine::DEFAULT_PARALLELISM;
use onboardeval_core::traits::LlmProvider;

use crate::ollama::{OllamaProvider, DEFAULT_BASE_URL};
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Top-level onboardeval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used for feedback synthesis.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Grading pipeline parameters.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Max submissions graded at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            engine: EngineConfig::default(),
            parallelism: default_parallelism(),
        }
    }
}

impl OnboardConfig {
    /// Configuration of the default provider. A missing `ollama` entry falls
    /// back to a local instance on the default port.
    pub fn default_provider_config(&self) -> Result<ProviderConfig> {
        match self.providers.get(&self.default_provider) {
            Some(config) => Ok(config.clone()),
            None if self.default_provider == "ollama" => Ok(ProviderConfig::Ollama {
                base_url: default_ollama_url(),
            }),
            None => anyhow::bail!(
                "default provider '{}' is not configured",
                self.default_provider
            ),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `onboardeval.toml` in the current directory
/// 2. `~/.config/onboardeval/config.toml`
///
/// Environment variable overrides: `ONBOARDEVAL_OPENAI_KEY`, `ONBOARDEVAL_OLLAMA_URL`.
pub fn load_config() -> Result<OnboardConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<OnboardConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("onboardeval.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => OnboardConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("ONBOARDEVAL_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(url) = std::env::var("ONBOARDEVAL_OLLAMA_URL") {
        config
            .providers
            .insert("ollama".into(), ProviderConfig::Ollama { base_url: url });
    }

    // Resolve env vars in all provider configs
    let resolved: HashMap<String, ProviderConfig> = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.providers = resolved;

    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<OnboardConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<OnboardConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("onboardeval"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("openai provider has no API key (set ONBOARDEVAL_OPENAI_KEY)");
            }
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )?))
        }
        ProviderConfig::Ollama { base_url } => Ok(Arc::new(OllamaProvider::new(base_url)?)),
    }
}
