//! The `gradeforge generate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use gradeforge_core::model::{ContentKind, GenerationRequest, ParamValue};
use gradeforge_core::orchestrator::Orchestrator;
use gradeforge_providers::config::load_config_from;

fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("invalid parameter '{raw}', expected key=value"))?;
    let key = key.trim();
    anyhow::ensure!(!key.is_empty(), "invalid parameter '{raw}', empty key");
    let value = match value.parse::<ParamValue>() {
        Ok(v) => v,
        Err(never) => match never {},
    };
    Ok((key.to_string(), value))
}

pub async fn execute(
    kind: ContentKind,
    topic: String,
    params: Vec<String>,
    provider: Option<String>,
    model: Option<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(!topic.trim().is_empty(), "topic must not be empty");

    let config = load_config_from(config_path.as_deref())?;
    let backend = config.backend(provider.as_deref())?;
    let orchestrator = Orchestrator::new(backend, config.orchestrator_config(model.as_deref()));

    let mut request = GenerationRequest::new(kind, topic);
    for raw in &params {
        let (key, value) = parse_param(raw)?;
        request = request.with_param(key, value);
    }

    let generation = orchestrator.generate(&request).await?;
    eprintln!(
        "Generated {} with {} item(s) via {} after {} attempt(s)",
        kind,
        generation.record.item_count(),
        generation.tier,
        generation.attempts.len()
    );

    let json = serde_json::to_string_pretty(&generation)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
