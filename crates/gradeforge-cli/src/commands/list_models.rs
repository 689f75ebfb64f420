//! The `gradeforge list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use gradeforge_providers::config::load_config_from;
use gradeforge_providers::ollama::OllamaBackend;
use gradeforge_providers::{create_backend, ProviderConfig};

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
                match OllamaBackend::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("  {name}: {e}");
                        continue;
                    }
                }
            }
            provider_config => create_backend(name, provider_config)?.available_models(),
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {} - {} ({}K context)",
                        model.id,
                        model.name,
                        model.max_context / 1000
                    );
                } else {
                    println!("  {} - {}", model.id, model.name);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `gradeforge init` to create a config file.");
    }

    Ok(())
}
