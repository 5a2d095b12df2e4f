//! Error types for the Promptforge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Promptforge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Context collection errors ---
    #[error("Collection error: {0}")]
    Collect(#[from] CollectError),

    // --- Prompt composition errors ---
    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    // --- Topic store errors ---
    #[error("Topic error: {0}")]
    Topic(#[from] TopicError),

    // --- Model gateway errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Workflow errors ---
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // --- Staging errors ---
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A single context request failed. Collection errors are recovered
/// locally — one failed request never aborts the remaining requests.
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command failed (exit {exit_code}): {command}")]
    CommandFailed { command: String, exit_code: i32 },

    #[error("I/O error reading {source_path}: {message}")]
    Io { source_path: String, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum ComposeError {
    /// Even the minimal required content (the latest user instruction)
    /// cannot fit in the token budget.
    #[error(
        "Prompt budget exceeded: instruction needs {required} tokens, budget is {budget}"
    )]
    BudgetExceeded { required: usize, budget: usize },
}

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("Topic not found: {0}")]
    NotFound(String),

    /// The topic's last-turn sequence advanced since the caller read it.
    /// The caller must re-read and retry against the latest state.
    #[error("Concurrent modification: expected last seq {expected}, found {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("Invalid branch point: topic has {last_seq} turns, requested {from_seq}")]
    InvalidBranchPoint { from_seq: u64, last_seq: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by model backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    /// The response arrived but does not satisfy the output contract
    /// (empty text, model mismatch, unparseable body). A response is either
    /// fully received and validated or treated as a failure.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the gateway may retry this failure with backoff.
    ///
    /// Rate limits, timeouts, 5xx responses, and network faults are
    /// transient; authentication and malformed requests fail immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_)
            | Self::MalformedRequest(_)
            | Self::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Workflow '{0}' is not defined")]
    Unknown(String),

    #[error("Workflow run cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum StageError {
    /// The turn's output does not match the expected structured-edit
    /// format. Surfaced to the user, never auto-corrected.
    #[error("Output is not a structured edit: {0}")]
    UnparseableOutput(String),

    /// A target file changed on disk since staging; re-stage required.
    #[error("Apply conflict: {path} changed on disk since staging")]
    ApplyConflict { path: String },

    #[error("Staged change already {0}")]
    AlreadyResolved(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_error_displays_sequences() {
        let err = Error::Topic(TopicError::ConcurrentModification {
            expected: 3,
            actual: 5,
        });
        assert!(err.to_string().contains("3"));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(ModelError::Timeout(30).is_transient());
        assert!(
            ModelError::Api {
                status_code: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(!ModelError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(
            !ModelError::Api {
                status_code: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!ModelError::InvalidResponse("empty".into()).is_transient());
    }

    #[test]
    fn step_failure_carries_cause() {
        let cause = Error::Model(ModelError::Timeout(30));
        let err = Error::Workflow(WorkflowError::StepFailed {
            step: "draft".into(),
            source: Box::new(cause),
        });
        assert!(err.to_string().contains("draft"));
    }
}
