//! Topic and Turn domain types.
//!
//! A Topic is a persistent conversation thread; a Turn is one
//! request/response exchange within it. Turns carry a gapless,
//! strictly-increasing sequence number assigned by the Topic Store,
//! and are immutable once finalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fragment::Provenance;
use crate::model::Usage;

/// Unique identifier for a topic (conversation thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId(pub String);

impl TopicId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for TopicId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a turn. A turn is created Pending when a request is
/// issued and transitions to Completed or Failed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TurnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown turn status: {other}")),
        }
    }
}

/// A single request/response exchange within a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: TurnId,

    /// Position within the topic; assigned by the store on append.
    /// Zero until persisted.
    #[serde(default)]
    pub seq: u64,

    /// The composed prompt that was sent
    pub prompt: String,

    /// The raw model response text
    pub response: String,

    /// Lifecycle status
    pub status: TurnStatus,

    /// Provenance of the context fragments that went into the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Provenance>,

    /// Token usage reported by the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Workflow that produced this turn, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,

    /// Workflow step that produced this turn, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a pending turn for a composed prompt.
    pub fn pending(prompt: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            seq: 0,
            prompt: prompt.into(),
            response: String::new(),
            status: TurnStatus::Pending,
            fragments: Vec::new(),
            usage: None,
            workflow: None,
            step: None,
            created_at: Utc::now(),
        }
    }

    /// Finalize this turn with a successful response.
    pub fn complete(mut self, response: impl Into<String>, usage: Option<Usage>) -> Self {
        self.response = response.into();
        self.usage = usage;
        self.status = TurnStatus::Completed;
        self
    }

    /// Finalize this turn as failed, recording the error text.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.response = error.into();
        self.status = TurnStatus::Failed;
        self
    }

    /// Label this turn with the workflow and step that produced it.
    pub fn with_step(mut self, workflow: impl Into<String>, step: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self.step = Some(step.into());
        self
    }

    /// Attach fragment provenance records.
    pub fn with_fragments(mut self, fragments: Vec<Provenance>) -> Self {
        self.fragments = fragments;
        self
    }
}

/// A persistent conversation thread composed of ordered turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Unique topic ID
    pub id: TopicId,

    /// Branch source: the parent topic and the sequence number up to
    /// which history is shared. `None` for root topics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<(TopicId, u64)>,

    /// Sequence number of the last turn (including inherited turns).
    #[serde(default)]
    pub last_seq: u64,

    /// When this topic was created
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create a new root topic.
    pub fn new() -> Self {
        Self {
            id: TopicId::new(),
            parent: None,
            last_seq: 0,
            created_at: Utc::now(),
        }
    }
}

impl Default for Topic {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_turn_has_no_response() {
        let turn = Turn::pending("fix bug X");
        assert_eq!(turn.status, TurnStatus::Pending);
        assert!(turn.response.is_empty());
        assert_eq!(turn.seq, 0);
    }

    #[test]
    fn complete_transitions_once() {
        let turn = Turn::pending("fix bug X").complete("done", None);
        assert_eq!(turn.status, TurnStatus::Completed);
        assert_eq!(turn.response, "done");
    }

    #[test]
    fn failed_turn_records_error_text() {
        let turn = Turn::pending("fix bug X").fail("timeout");
        assert_eq!(turn.status, TurnStatus::Failed);
        assert_eq!(turn.response, "timeout");
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::pending("hello").with_step("ask", "respond");
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.prompt, "hello");
        assert_eq!(back.workflow.as_deref(), Some("ask"));
        assert_eq!(back.step.as_deref(), Some("respond"));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [TurnStatus::Pending, TurnStatus::Completed, TurnStatus::Failed] {
            let parsed: TurnStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<TurnStatus>().is_err());
    }

    #[test]
    fn root_topic_has_no_parent() {
        let topic = Topic::new();
        assert!(topic.parent.is_none());
        assert_eq!(topic.last_seq, 0);
    }
}
