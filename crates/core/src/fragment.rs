//! Context fragment types.
//!
//! A fragment is one typed piece of contextual material (file contents,
//! a diff, command output) plus provenance and a token estimate. Fragments
//! are immutable once collected.

use serde::{Deserialize, Serialize};

/// The kind of material a fragment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Full contents of a workspace file
    FileContent,
    /// A version-control diff
    Diff,
    /// Captured output of a shell command
    CommandOutput,
    /// A directory listing
    DirectoryTree,
    /// Caller-supplied free text
    FreeText,
}

impl FragmentKind {
    /// Specificity rank used by the composer when the budget is tight.
    /// Lower rank is retained preferentially: explicit file/diff requests
    /// beat command output, which beats listings and free text.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Diff => 0,
            Self::FileContent => 1,
            Self::CommandOutput => 2,
            Self::DirectoryTree => 3,
            Self::FreeText => 4,
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FileContent => "file-content",
            Self::Diff => "diff",
            Self::CommandOutput => "command-output",
            Self::DirectoryTree => "directory-tree",
            Self::FreeText => "free-text",
        };
        write!(f, "{s}")
    }
}

/// Where a fragment came from, and whether it was cut down to fit
/// the size ceiling. Truncation is always recorded, never silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Fragment kind
    pub kind: FragmentKind,

    /// Source path or command string
    pub source: String,

    /// Whether the content was truncated to fit the per-fragment ceiling
    #[serde(default)]
    pub truncated: bool,
}

/// A typed piece of contextual material supplied to a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFragment {
    /// Kind of material
    pub kind: FragmentKind,

    /// The collected content
    pub content: String,

    /// Provenance record
    pub provenance: Provenance,

    /// Estimated size in tokens
    pub token_estimate: usize,
}

impl ContextFragment {
    /// Create a fragment, computing the token estimate from the content.
    ///
    /// Heuristic: 1 token ≈ 4 characters, rounding up.
    pub fn new(kind: FragmentKind, source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_estimate = content.len().div_ceil(4);
        Self {
            kind,
            content,
            provenance: Provenance {
                kind,
                source: source.into(),
                truncated: false,
            },
            token_estimate,
        }
    }

    /// Mark this fragment as truncated.
    pub fn truncated(mut self) -> Self {
        self.provenance.truncated = true;
        self
    }
}
