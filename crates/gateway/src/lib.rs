//! Model gateway — the single chokepoint between Promptforge and the
//! model backend.
//!
//! Wraps any [`ModelClient`] with:
//! - a per-call timeout
//! - bounded retries with exponential backoff and jitter, applied only
//!   to transient failures (rate limits, timeouts, 5xx, network faults)
//! - response validation: empty text or a response from the wrong model
//!   family is rejected, never surfaced to callers
//!
//! Non-transient failures (bad credentials, malformed requests) are
//! returned immediately without retrying.

pub mod mock;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use promptforge_core::error::ModelError;
use promptforge_core::model::{ModelClient, ModelRequest, ModelResponse};
use tracing::{debug, warn};

pub use mock::MockClient;
pub use openai::OpenAiClient;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry and validation wrapper around a model client.
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    max_attempts: u32,
    base_backoff: Duration,
    timeout: Duration,
}

impl ModelGateway {
    /// Wrap a client with default policy: 3 attempts, 500ms base
    /// backoff, 120s per-call timeout.
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_backoff = base_backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request, retrying transient failures with backoff.
    ///
    /// Returns the first fully validated response, or the last error
    /// once attempts are exhausted.
    pub async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut last_error = ModelError::Network("No attempts made".into());

        for attempt in 1..=self.max_attempts {
            debug!(
                client = self.client.name(),
                model = %request.model,
                attempt,
                total = self.max_attempts,
                "Invoking model backend"
            );

            let outcome =
                tokio::time::timeout(self.timeout, self.client.invoke(request.clone())).await;

            let error = match outcome {
                Ok(Ok(response)) => return Self::validate(&request, response),
                Ok(Err(e)) => e,
                Err(_) => ModelError::Timeout(self.timeout.as_secs()),
            };

            if !error.is_transient() {
                return Err(error);
            }

            if attempt < self.max_attempts {
                let delay = self.backoff_delay(attempt, &error);
                warn!(
                    client = self.client.name(),
                    error = %error,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient model failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = error;
        }

        Err(last_error)
    }

    /// Exponential backoff with jitter. A rate-limit hint from the
    /// backend overrides the computed delay when it is longer.
    fn backoff_delay(&self, attempt: u32, error: &ModelError) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt - 1));
        let jitter = {
            use rand::Rng;
            let mut rng = rand::rng();
            let spread = (self.base_backoff.as_millis() as u64 / 2).max(1);
            Duration::from_millis(rng.random_range(0..spread))
        };
        let mut delay = (exp + jitter).min(MAX_BACKOFF);

        if let ModelError::RateLimited { retry_after_secs } = error {
            delay = delay.max(Duration::from_secs(*retry_after_secs)).min(MAX_BACKOFF);
        }
        delay
    }

    /// Reject responses that violate the output contract.
    fn validate(
        request: &ModelRequest,
        response: ModelResponse,
    ) -> Result<ModelResponse, ModelError> {
        if response.text.trim().is_empty() {
            return Err(ModelError::InvalidResponse("Empty response text".into()));
        }
        if !models_match(&request.model, &response.model) {
            return Err(ModelError::InvalidResponse(format!(
                "Requested model '{}' but '{}' responded",
                request.model, response.model
            )));
        }
        Ok(response)
    }
}

/// Whether a backend-reported model identifier satisfies the requested
/// one. Backends commonly append a revision (`gpt-4o-2024-08-06` for a
/// `gpt-4o` request), so a dash-delimited prefix match is accepted.
fn models_match(requested: &str, responded: &str) -> bool {
    responded == requested || responded.starts_with(&format!("{requested}-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptforge_core::model::FinishReason;

    fn gateway(client: MockClient) -> ModelGateway {
        ModelGateway::new(Arc::new(client))
            .with_retry(3, Duration::from_millis(1))
            .with_timeout(Duration::from_secs(1))
    }

    fn request() -> ModelRequest {
        ModelRequest::new("hello", "mock-model")
    }

    #[test]
    fn model_family_matching() {
        assert!(models_match("gpt-4o", "gpt-4o"));
        assert!(models_match("gpt-4o", "gpt-4o-2024-08-06"));
        assert!(!models_match("gpt-4o", "gpt-4"));
        assert!(!models_match("gpt-4o", "claude-sonnet-4"));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let client = MockClient::new();
        client.push_ok("the answer");
        let calls = client.call_count();

        let response = gateway(client).invoke(request()).await.unwrap();
        assert_eq!(response.text, "the answer");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_retried_until_success() {
        let client = MockClient::new();
        client.push_err(ModelError::RateLimited { retry_after_secs: 0 });
        client.push_err(ModelError::RateLimited { retry_after_secs: 0 });
        client.push_ok("eventually");
        let calls = client.call_count();

        let response = gateway(client).invoke(request()).await.unwrap();
        assert_eq!(response.text, "eventually");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failure_not_retried() {
        let client = MockClient::new();
        client.push_err(ModelError::AuthenticationFailed("bad key".into()));
        client.push_ok("never reached");
        let calls = client.call_count();

        let result = gateway(client).invoke(request()).await;
        assert!(matches!(result, Err(ModelError::AuthenticationFailed(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let client = MockClient::new();
        for _ in 0..3 {
            client.push_err(ModelError::Network("connection reset".into()));
        }
        let calls = client.call_count();

        let result = gateway(client).invoke(request()).await;
        assert!(matches!(result, Err(ModelError::Network(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let client = MockClient::new();
        client.push_err(ModelError::Api {
            status_code: 503,
            message: "overloaded".into(),
        });
        client.push_ok("recovered");

        let response = gateway(client).invoke(request()).await.unwrap();
        assert_eq!(response.text, "recovered");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = MockClient::new();
        client.push_err(ModelError::Api {
            status_code: 400,
            message: "bad request".into(),
        });
        let calls = client.call_count();

        let result = gateway(client).invoke(request()).await;
        assert!(matches!(result, Err(ModelError::Api { status_code: 400, .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_response_rejected() {
        let client = MockClient::new();
        client.push_ok("   \n");

        let result = gateway(client).invoke(request()).await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn wrong_model_rejected() {
        let client = MockClient::new();
        client.push_response(ModelResponse {
            text: "looks fine".into(),
            usage: None,
            model: "some-other-model".into(),
            finish_reason: FinishReason::Stop,
        });

        let result = gateway(client).invoke(request()).await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn slow_backend_times_out_and_retries() {
        let client = MockClient::new().with_delay(Duration::from_millis(50));
        client.push_ok("too slow");
        client.push_ok("too slow again");
        let calls = client.call_count();

        let result = ModelGateway::new(Arc::new(client))
            .with_retry(2, Duration::from_millis(1))
            .with_timeout(Duration::from_millis(5))
            .invoke(request())
            .await;

        assert!(matches!(result, Err(ModelError::Timeout(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
