//! Scriptable mock model client for tests.
//!
//! Outcomes are queued and consumed in order; an exhausted script
//! answers with a canned success. A shared call counter lets tests
//! assert exactly how many backend calls a policy produced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promptforge_core::error::ModelError;
use promptforge_core::model::{FinishReason, ModelClient, ModelRequest, ModelResponse, Usage};

enum Scripted {
    Text(String),
    Response(ModelResponse),
    Error(ModelError),
}

/// A mock model client with a scripted outcome queue.
pub struct MockClient {
    script: Mutex<VecDeque<Scripted>>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Delay every call, for exercising timeout policy.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response with the given text. The reported
    /// model echoes the request so validation passes.
    pub fn push_ok(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a fully specified response.
    pub fn push_response(&self, response: ModelResponse) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Response(response));
    }

    /// Queue a failure.
    pub fn push_err(&self, error: ModelError) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Error(error));
    }

    /// Shared call counter, valid after the client is moved into a
    /// gateway or session.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Shared record of every prompt the client received.
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }

    fn ok_response(text: String, model: String) -> ModelResponse {
        let completion_tokens = (text.len() / 4) as u32;
        ModelResponse {
            text,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens,
                total_tokens: 10 + completion_tokens,
            }),
            model,
            finish_reason: FinishReason::Stop,
        }
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(Self::ok_response(text, request.model)),
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(Self::ok_response("ok".into(), request.model)),
        }
    }
}
