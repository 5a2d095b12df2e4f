//! Application stager — turns model output into reviewable workspace
//! mutations.
//!
//! The model never touches the filesystem directly. Its output is
//! parsed into a [`StagedChange`] which the user previews, then applies
//! or discards. Apply is all-or-nothing: every target file must still
//! match the digest captured at staging time, and a partial write is
//! rolled back.

pub mod diff;
pub mod parse;

use std::path::PathBuf;

use promptforge_core::error::StageError;
use promptforge_core::stage::{ChangeState, FileEdit, StagedChange};
use promptforge_core::topic::TurnId;
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub use diff::line_diff;
pub use parse::parse_structured_edit;

/// Stages, previews, and applies changes inside one workspace root.
pub struct Stager {
    workdir: PathBuf,
    commit: bool,
}

impl Stager {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            commit: false,
        }
    }

    /// Commit applied changes with git when a commit message is present.
    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    /// Parse a turn's output into a proposed change.
    ///
    /// Captures a digest of every target file's current content, so a
    /// later apply can detect that the workspace moved underneath it.
    pub async fn stage(&self, turn_id: TurnId, output: &str) -> Result<StagedChange, StageError> {
        let (mut edits, commit_message) = parse_structured_edit(output)?;

        for edit in &mut edits {
            edit.base_digest = self.current_digest(&edit.path).await?;
        }

        let change = StagedChange::proposed(turn_id, edits, commit_message);
        info!(change = %change.id, edits = change.edits.len(), "Staged change");
        Ok(change)
    }

    /// Render a human-readable preview of a proposed change.
    pub async fn preview(&self, change: &StagedChange) -> Result<String, StageError> {
        let mut out = String::new();
        for edit in &change.edits {
            let current = self.read_current(&edit.path).await?;
            match (&current, &edit.content) {
                (None, Some(new)) => {
                    out.push_str(&format!("create {}\n", edit.path));
                    out.push_str(&line_diff("", new));
                }
                (Some(old), Some(new)) => {
                    out.push_str(&format!("modify {}\n", edit.path));
                    out.push_str(&line_diff(old, new));
                }
                (Some(old), None) => {
                    out.push_str(&format!("delete {}\n", edit.path));
                    out.push_str(&line_diff(old, ""));
                }
                (None, None) => {
                    out.push_str(&format!("delete {} (already absent)\n", edit.path));
                }
            }
            out.push('\n');
        }
        if let Some(message) = &change.commit_message {
            out.push_str(&format!("commit message: {message}\n"));
        }
        Ok(out)
    }

    /// Apply a proposed change to the workspace, all edits or none.
    ///
    /// Fails with `ApplyConflict` if any target file changed since
    /// staging. On a mid-apply I/O failure, already-written files are
    /// restored from snapshots before the error is returned.
    pub async fn apply(&self, change: &mut StagedChange) -> Result<(), StageError> {
        if change.state != ChangeState::Proposed {
            return Err(StageError::AlreadyResolved(change.state.to_string()));
        }

        // Conflict check across every edit before touching anything
        for edit in &change.edits {
            let current = self.current_digest(&edit.path).await?;
            if current != edit.base_digest {
                return Err(StageError::ApplyConflict {
                    path: edit.path.clone(),
                });
            }
        }

        let mut snapshots: Vec<(String, Option<String>)> = Vec::with_capacity(change.edits.len());
        for edit in &change.edits {
            let snapshot = self.read_current(&edit.path).await?;
            if let Err(e) = self.write_edit(edit).await {
                self.rollback(&snapshots).await;
                return Err(e);
            }
            snapshots.push((edit.path.clone(), snapshot));
        }

        change.state = ChangeState::Applied;
        info!(change = %change.id, edits = change.edits.len(), "Applied change");

        if self.commit {
            if let Some(message) = change.commit_message.clone() {
                if let Err(e) = self.git_commit(&change.edits, &message).await {
                    warn!(change = %change.id, error = %e, "Git commit failed; edits remain applied");
                }
            }
        }
        Ok(())
    }

    /// Discard a proposed change without touching the workspace.
    pub fn discard(&self, change: &mut StagedChange) -> Result<(), StageError> {
        if change.state != ChangeState::Proposed {
            return Err(StageError::AlreadyResolved(change.state.to_string()));
        }
        change.state = ChangeState::Discarded;
        info!(change = %change.id, "Discarded change");
        Ok(())
    }

    fn target(&self, path: &str) -> PathBuf {
        self.workdir.join(path)
    }

    async fn read_current(&self, path: &str) -> Result<Option<String>, StageError> {
        match tokio::fs::read_to_string(self.target(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StageError::Io {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn current_digest(&self, path: &str) -> Result<Option<String>, StageError> {
        Ok(self.read_current(path).await?.map(|c| hex_digest(&c)))
    }

    async fn write_edit(&self, edit: &FileEdit) -> Result<(), StageError> {
        let target = self.target(&edit.path);
        let io_err = |e: std::io::Error| StageError::Io {
            path: edit.path.clone(),
            message: e.to_string(),
        };

        match &edit.content {
            Some(content) => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
                }
                tokio::fs::write(&target, content).await.map_err(io_err)?;
            }
            None => match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            },
        }
        debug!(path = %edit.path, "Wrote edit");
        Ok(())
    }

    async fn rollback(&self, snapshots: &[(String, Option<String>)]) {
        for (path, snapshot) in snapshots {
            let target = self.target(path);
            let restored = match snapshot {
                Some(content) => tokio::fs::write(&target, content).await,
                None => match tokio::fs::remove_file(&target).await {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = restored {
                warn!(path = %path, error = %e, "Rollback failed");
            }
        }
    }

    async fn git_commit(&self, edits: &[FileEdit], message: &str) -> Result<(), StageError> {
        let paths: Vec<&str> = edits.iter().map(|e| e.path.as_str()).collect();
        self.run_git(&[&["add", "--"][..], &paths[..]].concat())
            .await?;
        self.run_git(&["commit", "-m", message]).await?;
        info!(files = edits.len(), "Committed applied change");
        Ok(())
    }

    async fn run_git(&self, args: &[&str]) -> Result<(), StageError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
            .map_err(|e| StageError::Io {
                path: self.workdir.display().to_string(),
                message: format!("git: {e}"),
            })?;
        if !output.status.success() {
            return Err(StageError::Io {
                path: self.workdir.display().to_string(),
                message: format!(
                    "git {} failed: {}",
                    args.first().unwrap_or(&""),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

fn hex_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn edit_output(path: &str, content: &str) -> String {
        serde_json::json!({
            "edits": [{"path": path, "content": content}],
            "commit_message": "test change"
        })
        .to_string()
    }

    #[tokio::test]
    async fn stage_captures_base_digests() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let stager = Stager::new(dir.path());

        let change = stager
            .stage(TurnId::new(), &edit_output("a.py", "new\n"))
            .await
            .unwrap();
        assert_eq!(change.state, ChangeState::Proposed);
        assert_eq!(change.edits[0].base_digest.as_deref(), Some(hex_digest("old\n").as_str()));
    }

    #[tokio::test]
    async fn stage_of_new_file_has_no_digest() {
        let dir = TempDir::new().unwrap();
        let stager = Stager::new(dir.path());

        let change = stager
            .stage(TurnId::new(), &edit_output("fresh.py", "print()\n"))
            .await
            .unwrap();
        assert!(change.edits[0].base_digest.is_none());
    }

    #[tokio::test]
    async fn apply_writes_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let stager = Stager::new(dir.path());

        let mut change = stager
            .stage(TurnId::new(), &edit_output("a.py", "new\n"))
            .await
            .unwrap();
        stager.apply(&mut change).await.unwrap();

        assert_eq!(change.state, ChangeState::Applied);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn apply_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let stager = Stager::new(dir.path());

        let mut change = stager
            .stage(TurnId::new(), &edit_output("src/deep/mod.rs", "pub fn f() {}\n"))
            .await
            .unwrap();
        stager.apply(&mut change).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("src/deep/mod.rs")).unwrap();
        assert_eq!(written, "pub fn f() {}\n");
    }

    #[tokio::test]
    async fn apply_deletes_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gone.py"), "bye\n").unwrap();
        let stager = Stager::new(dir.path());

        let output = r#"{"edits": [{"path": "gone.py", "delete": true}]}"#;
        let mut change = stager.stage(TurnId::new(), output).await.unwrap();
        stager.apply(&mut change).await.unwrap();

        assert!(!dir.path().join("gone.py").exists());
    }

    #[tokio::test]
    async fn concurrent_edit_detected_at_apply() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let stager = Stager::new(dir.path());

        let mut change = stager
            .stage(TurnId::new(), &edit_output("a.py", "new\n"))
            .await
            .unwrap();

        // Workspace moves underneath the staged change
        std::fs::write(dir.path().join("a.py"), "someone else\n").unwrap();

        let result = stager.apply(&mut change).await;
        assert!(matches!(result, Err(StageError::ApplyConflict { .. })));
        assert_eq!(change.state, ChangeState::Proposed);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "someone else\n"
        );
    }

    #[tokio::test]
    async fn apply_is_terminal() {
        let dir = TempDir::new().unwrap();
        let stager = Stager::new(dir.path());

        let mut change = stager
            .stage(TurnId::new(), &edit_output("a.py", "x\n"))
            .await
            .unwrap();
        stager.apply(&mut change).await.unwrap();

        let again = stager.apply(&mut change).await;
        assert!(matches!(again, Err(StageError::AlreadyResolved(_))));
        let discard = stager.discard(&mut change);
        assert!(matches!(discard, Err(StageError::AlreadyResolved(_))));
    }

    #[tokio::test]
    async fn discard_leaves_workspace_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let stager = Stager::new(dir.path());

        let mut change = stager
            .stage(TurnId::new(), &edit_output("a.py", "new\n"))
            .await
            .unwrap();
        stager.discard(&mut change).unwrap();

        assert_eq!(change.state, ChangeState::Discarded);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), "old\n");
    }

    #[tokio::test]
    async fn preview_shows_creates_modifies_and_deletes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mod.py"), "a\nb\n").unwrap();
        std::fs::write(dir.path().join("del.py"), "x\n").unwrap();
        let stager = Stager::new(dir.path());

        let output = serde_json::json!({
            "edits": [
                {"path": "new.py", "content": "fresh\n"},
                {"path": "mod.py", "content": "a\nc\n"},
                {"path": "del.py", "delete": true}
            ]
        })
        .to_string();
        let change = stager.stage(TurnId::new(), &output).await.unwrap();
        let preview = stager.preview(&change).await.unwrap();

        assert!(preview.contains("create new.py"));
        assert!(preview.contains("+fresh"));
        assert!(preview.contains("modify mod.py"));
        assert!(preview.contains("-b"));
        assert!(preview.contains("+c"));
        assert!(preview.contains("delete del.py"));
        assert!(preview.contains("-x"));
    }

    #[tokio::test]
    async fn restaging_an_applied_edit_diffs_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let stager = Stager::new(dir.path());

        let output = edit_output("a.py", "new\n");
        let mut change = stager.stage(TurnId::new(), &output).await.unwrap();
        stager.apply(&mut change).await.unwrap();

        // The same proposal staged again has nothing left to show
        let restaged = stager.stage(TurnId::new(), &output).await.unwrap();
        let preview = stager.preview(&restaged).await.unwrap();
        assert!(!preview.lines().any(|l| l.starts_with('-') || l.starts_with('+')));
    }

    #[tokio::test]
    async fn multi_file_apply_is_atomic() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("one.py"), "1\n").unwrap();
        std::fs::write(dir.path().join("two.py"), "2\n").unwrap();
        let stager = Stager::new(dir.path());

        let output = serde_json::json!({
            "edits": [
                {"path": "one.py", "content": "1a\n"},
                {"path": "two.py", "content": "2a\n"}
            ]
        })
        .to_string();
        let mut change = stager.stage(TurnId::new(), &output).await.unwrap();

        // Second target drifts after staging; nothing may be written
        std::fs::write(dir.path().join("two.py"), "drifted\n").unwrap();
        let result = stager.apply(&mut change).await;

        assert!(matches!(result, Err(StageError::ApplyConflict { path }) if path == "two.py"));
        assert_eq!(std::fs::read_to_string(dir.path().join("one.py")).unwrap(), "1\n");
    }
}
