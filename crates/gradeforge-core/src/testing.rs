//! Scripted backend for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::traits::{InvokeRequest, InvokeResponse, ModelInfo, TextBackend, TokenUsage};

pub(crate) enum Scripted {
    Text(String),
    Error(BackendError),
}

impl Scripted {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Scripted::Text(text.into())
    }

    pub(crate) fn error(error: BackendError) -> Self {
        Scripted::Error(error)
    }
}

type Router = Box<dyn Fn(&str) -> Scripted + Send + Sync>;

/// Replays queued responses in order, or answers by prompt content when
/// routed. An exhausted script answers with a 500.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    router: Option<Router>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            router: None,
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answer every prompt through `route`. Order-independent, for concurrent callers.
    pub(crate) fn routed(route: impl Fn(&str) -> Scripted + Send + Sync + 'static) -> Self {
        Self {
            router: Some(Box::new(route)),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, BackendError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = match &self.router {
            Some(route) => Some(route(&request.prompt)),
            None => self.script.lock().unwrap().pop_front(),
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match next {
            Some(Scripted::Text(text)) => Ok(InvokeResponse {
                text,
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 0,
            }),
            Some(Scripted::Error(e)) => Err(e),
            None => Err(BackendError::ApiError {
                status: 500,
                message: "script exhausted".into(),
            }),
        }
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}
