//! The `onboardeval list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use onboardeval_providers::config::{load_config_from, ProviderConfig};
use onboardeval_providers::create_provider;
use onboardeval_providers::ollama::OllamaProvider;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let models = match &config.providers[name] {
            ProviderConfig::Ollama { base_url } => {
                let ollama = OllamaProvider::new(base_url)?;
                if !ollama.is_available().await {
                    println!("Provider: {name} (not reachable at {base_url})\n");
                    continue;
                }
                ollama.list_models_async().await?
            }
            other => match create_provider(other) {
                Ok(provider) => provider.available_models(),
                Err(e) => {
                    println!("Provider: {name} ({e})\n");
                    continue;
                }
            },
        };

        if !models.is_empty() {
            found_any = true;
            let marker = if *name == config.default_provider {
                " [default]"
            } else {
                ""
            };
            println!("Provider: {name}{marker}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {}: {} ({}K context)",
                        model.id,
                        model.name,
                        model.max_context / 1000
                    );
                } else {
                    println!("  {}: {}", model.id, model.name);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `onboardeval init` to create a config file.");
    }

    Ok(())
}
