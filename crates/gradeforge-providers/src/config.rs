//! Configuration loading and the backend factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gradeforge_core::error::ConfigurationError;
use gradeforge_core::grading::GradingConfig;
use gradeforge_core::normalize::default_envelope_keys;
use gradeforge_core::orchestrator::OrchestratorConfig;
use gradeforge_core::traits::TextBackend;

use crate::anthropic::AnthropicBackend;
use crate::mock::MockBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAiBackend;

/// Configuration for a single backend.
///
/// `Debug` masks API keys.
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
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline backend answering every prompt with `response`.
    Mock {
        #[serde(default)]
        response: Option<String>,
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
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { response } => f
                .debug_struct("Mock")
                .field("response", response)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Grading knobs, the `[grading]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSection {
    pub fallback_fraction: f64,
    pub heuristic_fraction: f64,
    pub parallelism: usize,
    pub submission_excerpt_chars: usize,
}

impl Default for GradingSection {
    fn default() -> Self {
        let defaults = GradingConfig::default();
        Self {
            fallback_fraction: defaults.fallback_fraction,
            heuristic_fraction: defaults.heuristic_fraction,
            parallelism: defaults.parallelism,
            submission_excerpt_chars: defaults.submission_excerpt_chars,
        }
    }
}

/// Top-level gradeforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeforgeConfig {
    /// Backend configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on one backend call, in seconds.
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
    /// Wrapper keys unwrapped from backend payloads.
    #[serde(default = "default_envelope_keys")]
    pub envelope_keys: Vec<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub grading: GradingSection,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_backend_timeout() -> u64 {
    60
}

impl Default for GradeforgeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            backend_timeout_secs: default_backend_timeout(),
            envelope_keys: default_envelope_keys(),
            system_prompt: None,
            grading: GradingSection::default(),
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

impl GradeforgeConfig {
    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be between 0.0 and 2.0"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be positive"));
        }
        if self.backend_timeout_secs == 0 {
            return Err(invalid("backend_timeout_secs", "must be positive"));
        }
        let grading = &self.grading;
        if !(0.0..=1.0).contains(&grading.fallback_fraction) {
            return Err(invalid("grading.fallback_fraction", "must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&grading.heuristic_fraction) {
            return Err(invalid("grading.heuristic_fraction", "must be between 0 and 1"));
        }
        if grading.parallelism == 0 {
            return Err(invalid("grading.parallelism", "must be at least 1"));
        }
        Ok(())
    }

    /// Ladder settings for the core, with an optional model override.
    pub fn orchestrator_config(&self, model: Option<&str>) -> OrchestratorConfig {
        OrchestratorConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            backend_timeout: Duration::from_secs(self.backend_timeout_secs),
            envelope_keys: self.envelope_keys.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }

    pub fn grading_config(&self) -> GradingConfig {
        GradingConfig {
            fallback_fraction: self.grading.fallback_fraction,
            heuristic_fraction: self.grading.heuristic_fraction,
            parallelism: self.grading.parallelism,
            submission_excerpt_chars: self.grading.submission_excerpt_chars,
        }
    }

    /// Build the named backend, or the default one.
    pub fn backend(&self, name: Option<&str>) -> Result<Arc<dyn TextBackend>, ConfigurationError> {
        let name = name.unwrap_or(&self.default_provider);
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownProvider(name.to_string()))?;
        create_backend(name, provider)
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
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gradeforge.toml` in the current directory
/// 2. `~/.config/gradeforge/config.toml`
///
/// Environment variable overrides: `GRADEFORGE_OPENAI_KEY`, `GRADEFORGE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<GradeforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GradeforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("gradeforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<GradeforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GradeforgeConfig::default(),
    };

    if let Ok(key) = std::env::var("GRADEFORGE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("GRADEFORGE_OPENAI_KEY") {
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

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    config.validate().with_context(|| match &config_path {
        Some(path) => format!("invalid config: {}", path.display()),
        None => "invalid default config".to_string(),
    })?;

    tracing::debug!(
        path = ?config_path,
        providers = config.providers.len(),
        "configuration loaded"
    );

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gradeforge"))
}

/// Create a backend instance from its configuration.
///
/// An empty API key is a [`ConfigurationError::MissingCredential`] naming the provider entry.
pub fn create_backend(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn TextBackend>, ConfigurationError> {
    let named = |e: ConfigurationError| match e {
        ConfigurationError::MissingCredential(_) => {
            ConfigurationError::MissingCredential(name.to_string())
        }
        other => other,
    };

    match config {
        ProviderConfig::Anthropic { api_key, base_url } => Ok(Arc::new(
            AnthropicBackend::new(api_key, base_url.clone()).map_err(named)?,
        )),
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Arc::new(
            OpenAiBackend::new(api_key, base_url.clone(), org_id.clone()).map_err(named)?,
        )),
        ProviderConfig::Ollama { base_url } => Ok(Arc::new(OllamaBackend::new(base_url)?)),
        ProviderConfig::Mock { response } => Ok(Arc::new(match response {
            Some(text) => MockBackend::with_fixed_response(text),
            None => MockBackend::new(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_GRADEFORGE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_GRADEFORGE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_GRADEFORGE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_GRADEFORGE_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("unterminated ${oops"), "unterminated ${oops");
        std::env::remove_var("_GRADEFORGE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = GradeforgeConfig::default();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.backend_timeout_secs, 60);
        assert_eq!(config.grading.parallelism, 4);
        assert_eq!(config.grading.heuristic_fraction, 0.7);
        assert_eq!(config.grading.fallback_fraction, 0.0);
        assert!(config.envelope_keys.iter().any(|k| k == "data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "ollama"
default_model = "llama3.1:8b"
backend_timeout_secs = 30
envelope_keys = ["data"]

[grading]
heuristic_fraction = 0.5

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.ollama]
type = "ollama"
"#;
        let config: GradeforgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert_eq!(config.envelope_keys, vec!["data".to_string()]);
        assert_eq!(config.grading.heuristic_fraction, 0.5);
        assert_eq!(config.grading.parallelism, 4);

        let orchestrator = config.orchestrator_config(None);
        assert_eq!(orchestrator.model, "llama3.1:8b");
        assert_eq!(orchestrator.backend_timeout, Duration::from_secs(30));
        assert_eq!(config.orchestrator_config(Some("other")).model, "other");
        assert_eq!(config.grading_config().heuristic_fraction, 0.5);
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Anthropic {
            api_key: "sk-secret-value".into(),
            base_url: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn empty_key_is_missing_credential() {
        let config = ProviderConfig::OpenAI {
            api_key: String::new(),
            base_url: None,
            org_id: None,
        };
        match create_backend("school-openai", &config) {
            Err(ConfigurationError::MissingCredential(name)) => assert_eq!(name, "school-openai"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("backend built without a key"),
        }
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = GradeforgeConfig::default();
        assert!(matches!(
            config.backend(Some("nope")),
            Err(ConfigurationError::UnknownProvider(name)) if name == "nope"
        ));
    }

    #[test]
    fn invalid_grading_values_rejected() {
        let mut config = GradeforgeConfig::default();
        config.grading.heuristic_fraction = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { field, .. })
                if field == "grading.heuristic_fraction"
        ));

        let mut config = GradeforgeConfig::default();
        config.grading.parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_resolves_env_references() {
        std::env::set_var("_GRADEFORGE_TEST_OLLAMA_HOST", "10.0.0.7");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "local"

[providers.local]
type = "ollama"
base_url = "http://${{_GRADEFORGE_TEST_OLLAMA_HOST}}:11434"
"#
        )
        .unwrap();

        let config = load_config_from(Some(file.path())).unwrap();
        assert!(matches!(
            config.providers.get("local"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://10.0.0.7:11434"
        ));
        assert_eq!(config.backend(None).unwrap().name(), "ollama");
        std::env::remove_var("_GRADEFORGE_TEST_OLLAMA_HOST");
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend_timeout_secs = 0").unwrap();
        let err = load_config_from(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("backend_timeout_secs"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/gradeforge.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
