//! Anthropic Messages API backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use gradeforge_core::error::{BackendError, ConfigurationError};
use gradeforge_core::traits::{
    InvokeRequest, InvokeResponse, ModelInfo, TextBackend, TokenUsage, DEFAULT_SYSTEM_PROMPT,
};

use crate::http::{build_client, check_status, decode_error, send_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Anthropic API backend.
pub struct AnthropicBackend {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, ConfigurationError> {
        if api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential("anthropic".into()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    model: String,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[async_trait]
impl TextBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, BackendError> {
        let start = Instant::now();

        let body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;

        let response = check_status(response, &request.model).await?;
        let api_response: AnthropicResponse = response.json().await.map_err(decode_error)?;

        let text = api_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(InvokeResponse {
            text,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: api_response.usage.input_tokens,
                completion_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-sonnet-4-20250514".into(),
                name: "Claude Sonnet 4".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
            ModelInfo {
                id: "claude-haiku-4-5-20251001".into(),
                name: "Claude Haiku 4.5".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(prompt: &str) -> InvokeRequest {
        InvokeRequest {
            model: "claude-sonnet-4-20250514".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn successful_invocation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "content": [{"type": "text", "text": "{\"questions\": []}"}],
            "model": "claude-sonnet-4-20250514",
            "usage": {"input_tokens": 50, "output_tokens": 20}
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "system": DEFAULT_SYSTEM_PROMPT,
                "messages": [{"role": "user", "content": "Create a test"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("test-key", Some(server.uri())).unwrap();
        let response = backend.invoke(&request("Create a test")).await.unwrap();
        assert_eq!(response.text, "{\"questions\": []}");
        assert_eq!(response.token_usage.prompt_tokens, 50);
        assert_eq!(response.token_usage.total_tokens, 70);
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("bad-key", Some(server.uri())).unwrap();
        let err = backend.invoke(&request("test")).await.unwrap_err();
        assert!(
            matches!(&err, BackendError::AuthenticationFailed(msg) if msg == "invalid x-api-key"),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("test-key", Some(server.uri())).unwrap();
        let err = backend.invoke(&request("test")).await.unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(5000));
    }

    #[tokio::test]
    async fn server_error_carries_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("test-key", Some(server.uri())).unwrap();
        let err = backend.invoke(&request("test")).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::ApiError { status: 529, ref message } if message == "Overloaded"
        ));
    }

    #[test]
    fn empty_key_is_missing_credential() {
        assert!(matches!(
            AnthropicBackend::new("  ", None),
            Err(ConfigurationError::MissingCredential(_))
        ));
    }
}
