//! gradeforge-providers: text-generation backends.
//!
//! Implements the `TextBackend` trait for Anthropic, OpenAI-compatible and
//! Ollama endpoints, plus a scripted mock backend and the TOML
//! configuration that selects between them.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_backend, load_config, GradeforgeConfig, ProviderConfig};
pub use mock::MockBackend;
