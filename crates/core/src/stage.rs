//! Staged change types — proposed workspace mutations pending review.
//!
//! A staged change is owned by the session that created it until it is
//! applied (ownership transfers to the workspace) or discarded (released).
//! Applied and discarded are terminal states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topic::TurnId;

/// Lifecycle of a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeState {
    Proposed,
    Applied,
    Discarded,
}

impl std::fmt::Display for ChangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Applied => "applied",
            Self::Discarded => "discarded",
        };
        write!(f, "{s}")
    }
}

/// One proposed file mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Target path, relative to the workspace root
    pub path: String,

    /// New file content; `None` means delete the file
    pub content: Option<String>,

    /// SHA-256 hex digest of the file's content at staging time.
    /// `None` means the file did not exist when staged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_digest: Option<String>,
}

/// A proposed, reviewable workspace mutation derived from a turn's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedChange {
    /// Unique change ID
    pub id: String,

    /// The turn whose output produced this change
    pub turn_id: TurnId,

    /// Proposed file edits, in output order
    pub edits: Vec<FileEdit>,

    /// Commit message proposed by the model, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    /// Lifecycle state
    pub state: ChangeState,

    /// When this change was staged
    pub created_at: DateTime<Utc>,
}

impl StagedChange {
    /// Create a proposed change from parsed edits.
    pub fn proposed(turn_id: TurnId, edits: Vec<FileEdit>, commit_message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turn_id,
            edits,
            commit_message,
            state: ChangeState::Proposed,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposed_change_starts_proposed() {
        let change = StagedChange::proposed(
            TurnId::new(),
            vec![FileEdit {
                path: "a.py".into(),
                content: Some("print('fixed')\n".into()),
                base_digest: None,
            }],
            Some("fix bug X".into()),
        );
        assert_eq!(change.state, ChangeState::Proposed);
        assert_eq!(change.edits.len(), 1);
    }

    #[test]
    fn edit_serialization_roundtrip() {
        let edit = FileEdit {
            path: "src/main.rs".into(),
            content: None,
            base_digest: Some("abc123".into()),
        };
        let json = serde_json::to_string(&edit).unwrap();
        let back: FileEdit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edit);
    }
}
