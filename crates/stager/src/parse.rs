//! Structured-edit parsing.
//!
//! A turn's output proposes workspace edits as a JSON document, either
//! raw or inside a ```json fence:
//!
//! ```text
//! {
//!   "edits": [
//!     {"path": "src/lib.rs", "content": "..."},
//!     {"path": "old_module.rs", "delete": true}
//!   ],
//!   "commit_message": "Fix the widget"
//! }
//! ```
//!
//! Anything that does not match is rejected as-is; the output is never
//! auto-corrected or partially applied.

use promptforge_core::error::StageError;
use promptforge_core::stage::FileEdit;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawChange {
    edits: Vec<RawEdit>,
    #[serde(default)]
    commit_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEdit {
    path: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    delete: bool,
}

/// Parse a model output into file edits and an optional commit message.
pub fn parse_structured_edit(
    output: &str,
) -> Result<(Vec<FileEdit>, Option<String>), StageError> {
    let json = extract_json(output)
        .ok_or_else(|| StageError::UnparseableOutput("no JSON document found".into()))?;

    let raw: RawChange = serde_json::from_str(json)
        .map_err(|e| StageError::UnparseableOutput(e.to_string()))?;

    if raw.edits.is_empty() {
        return Err(StageError::UnparseableOutput("empty edit list".into()));
    }

    let mut edits = Vec::with_capacity(raw.edits.len());
    for edit in raw.edits {
        validate_path(&edit.path)?;
        let content = match (edit.content, edit.delete) {
            (Some(content), false) => Some(content),
            (None, true) => None,
            (Some(_), true) => {
                return Err(StageError::UnparseableOutput(format!(
                    "edit for '{}' has both content and delete",
                    edit.path
                )));
            }
            (None, false) => {
                return Err(StageError::UnparseableOutput(format!(
                    "edit for '{}' has neither content nor delete",
                    edit.path
                )));
            }
        };
        edits.push(FileEdit {
            path: edit.path,
            content,
            base_digest: None,
        });
    }

    Ok((edits, raw.commit_message))
}

/// Find the JSON document in a model output: the first ```json fence
/// if present, otherwise the output itself when it is bare JSON.
fn extract_json(output: &str) -> Option<&str> {
    for marker in ["```json", "```"] {
        if let Some(start) = output.find(marker) {
            let body = &output[start + marker.len()..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    let trimmed = output.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    None
}

/// Edits must stay inside the workspace: relative paths only, no
/// parent-directory traversal.
fn validate_path(path: &str) -> Result<(), StageError> {
    if path.is_empty() {
        return Err(StageError::UnparseableOutput("empty edit path".into()));
    }
    let p = std::path::Path::new(path);
    if p.is_absolute() {
        return Err(StageError::UnparseableOutput(format!(
            "absolute edit path '{path}'"
        )));
    }
    if p.components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(StageError::UnparseableOutput(format!(
            "edit path '{path}' escapes the workspace"
        )));
    }
    Ok(())
}
