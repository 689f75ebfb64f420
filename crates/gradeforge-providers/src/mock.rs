//! Mock backend for exercising the ladder and the grading engine offline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use gradeforge_core::error::BackendError;
use gradeforge_core::traits::{InvokeRequest, InvokeResponse, ModelInfo, TextBackend, TokenUsage};

/// A mock text backend.
///
/// Answers are resolved in order: the scripted queue, then the first
/// prompt-substring route that matches, then the default response, then the
/// default error. With none of these the call fails with HTTP 500.
#[derive(Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    routes: Vec<(String, String)>,
    default_response: Option<String>,
    default_error: Option<BackendError>,
    call_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `response`.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: Some(response.to_string()),
            ..Self::default()
        }
    }

    /// Replay `script` in order, one entry per call.
    pub fn scripted(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Fail every unscripted, unrouted call with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self {
            default_error: Some(error),
            ..Self::default()
        }
    }

    /// Answer prompts containing `needle` with `response`. Routes are tried in insertion order.
    pub fn with_route(mut self, needle: &str, response: &str) -> Self {
        self.routes.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.prompts).last().cloned()
    }

    fn answer(&self, prompt: &str) -> Result<String, BackendError> {
        if let Some(next) = lock(&self.script).pop_front() {
            return next;
        }
        if let Some((_, response)) = self
            .routes
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Ok(response.clone());
        }
        if let Some(response) = &self.default_response {
            return Ok(response.clone());
        }
        Err(self
            .default_error
            .clone()
            .unwrap_or_else(|| BackendError::ApiError {
                status: 500,
                message: "mock backend has no response".into(),
            }))
    }
}

#[async_trait]
impl TextBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, BackendError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.prompts).push(request.prompt.clone());

        let text = self.answer(&request.prompt)?;
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (text.len() / 4) as u32;

        Ok(InvokeResponse {
            text,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> InvokeRequest {
        InvokeRequest {
            model: "mock-model".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let backend = MockBackend::with_fixed_response("{\"ok\": true}");
        let response = backend.invoke(&request("anything")).await.unwrap();
        assert_eq!(response.text, "{\"ok\": true}");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.last_prompt().as_deref(), Some("anything"));
    }

    #[tokio::test]
    async fn script_takes_priority_then_routes() {
        let backend = MockBackend::scripted(vec![
            Err(BackendError::Timeout(60)),
            Ok("second".into()),
        ])
        .with_route("critical thinking", "{\"critical_thinking_score\": 7}");

        let err = backend
            .invoke(&request("Evaluate critical thinking"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(60)));

        let second = backend.invoke(&request("Evaluate critical thinking")).await;
        assert_eq!(second.unwrap().text, "second");

        let routed = backend.invoke(&request("Evaluate critical thinking")).await;
        assert!(routed.unwrap().text.contains("critical_thinking_score"));

        let err = backend.invoke(&request("unmatched")).await.unwrap_err();
        assert!(matches!(err, BackendError::ApiError { status: 500, .. }));
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn failing_backend_repeats_error() {
        let backend = MockBackend::failing(BackendError::NetworkError("reset".into()));
        for _ in 0..3 {
            let err = backend.invoke(&request("x")).await.unwrap_err();
            assert!(matches!(err, BackendError::NetworkError(_)));
        }
        assert_eq!(backend.prompts().len(), 3);
    }
}
