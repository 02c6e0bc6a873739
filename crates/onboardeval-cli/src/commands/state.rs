//! Loading and saving the learner state file shared by several commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use onboardeval_core::engine::GradingEngine;
use onboardeval_core::parser::{load_catalog, validate_catalog};
use onboardeval_core::store::MemoryStore;
use onboardeval_core::traits::LlmProvider;
use onboardeval_providers::mock::MockProvider;
use onboardeval_providers::{create_provider, OnboardConfig};

/// Open the state file (empty when missing), optionally refreshing its
/// catalog from `catalog`.
pub fn open(state: &Path, catalog: Option<&Path>) -> Result<Arc<MemoryStore>> {
    let store = if state.exists() {
        MemoryStore::load_json(state)?
    } else {
        tracing::debug!("state file {} not found, starting empty", state.display());
        MemoryStore::new()
    };

    let store = match catalog {
        Some(path) => {
            let catalog = load_catalog(path)
                .with_context(|| format!("failed to load catalog {}", path.display()))?;
            let warnings = validate_catalog(&catalog);
            if !warnings.is_empty() {
                tracing::warn!(
                    count = warnings.len(),
                    "catalog has validation warnings; run `onboardeval validate`"
                );
            }
            store
                .with_assessments(catalog.assessments)
                .with_badges(catalog.badges)
        }
        None => store,
    };

    Ok(Arc::new(store))
}

/// Persist the store back to the state file.
pub fn save(store: &MemoryStore, state: &Path) -> Result<()> {
    store.save_json(state)
}

/// Build a grading engine over `store` from the loaded configuration.
///
/// With `offline` (or model feedback disabled in config) no provider is
/// contacted and every feedback comes from the templates.
pub fn engine(
    store: Arc<MemoryStore>,
    config: &OnboardConfig,
    offline: bool,
) -> Result<GradingEngine> {
    let mut engine_config = config.engine.clone();
    if offline {
        engine_config.enable_model_feedback = false;
    }

    let provider: Arc<dyn LlmProvider> = if engine_config.enable_model_feedback {
        create_provider(&config.default_provider_config()?)?
    } else {
        Arc::new(MockProvider::failing())
    };
    tracing::debug!(
        provider = provider.name(),
        model_feedback = engine_config.enable_model_feedback,
        "grading engine ready"
    );

    Ok(GradingEngine::new(store, provider, engine_config))
}
