//! The `gradeforge init` command.

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    let path = std::path::Path::new("gradeforge.toml");
    if path.exists() {
        println!("gradeforge.toml already exists, skipping.");
        return Ok(());
    }

    std::fs::write(path, SAMPLE_CONFIG).context("failed to write gradeforge.toml")?;
    println!("Created gradeforge.toml");

    println!("\nNext steps:");
    println!("  1. Export ANTHROPIC_API_KEY or OPENAI_API_KEY, or edit gradeforge.toml");
    println!(
        "  2. Run: gradeforge generate --kind test --topic \"photosynthesis\" \
         --param num_questions=5"
    );
    println!("  3. Run: gradeforge grade --assignment assignment.json --submission answer.txt");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gradeforge configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
temperature = 0.3
max_tokens = 4096
backend_timeout_secs = 60
envelope_keys = ["test", "data", "result"]

[grading]
fallback_fraction = 0.0
heuristic_fraction = 0.7
parallelism = 4
submission_excerpt_chars = 2000

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config: gradeforge_providers::GradeforgeConfig = load_sample(SAMPLE_CONFIG);
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.grading.parallelism, 4);
        assert!(config.validate().is_ok());
    }

    fn load_sample(s: &str) -> gradeforge_providers::GradeforgeConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradeforge.toml");
        std::fs::write(&path, s).unwrap();
        gradeforge_providers::config::load_config_from(Some(&path)).unwrap()
    }
}
