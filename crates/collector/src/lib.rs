//! Context collection — gathers raw workspace material into typed fragments.
//!
//! Given a list of context requests (file paths, command strings, diff
//! ranges), produces context fragments with provenance and size ceilings.
//! A failed request is recorded per-request and never aborts collection of
//! the remaining requests.
//!
//! Commands run through the system shell with the caller's working
//! directory and environment; output is captured, never streamed.

use std::path::{Path, PathBuf};

use promptforge_core::error::CollectError;
use promptforge_core::fragment::{ContextFragment, FragmentKind};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Marker appended to truncated content. Recorded in provenance as well.
const TRUNCATION_MARKER: &str = "\n[truncated]";

/// A single context request: what to collect and where from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    /// What kind of material to collect
    pub kind: RequestKind,

    /// Source locator — file path, command string, diff range, or text
    pub locator: String,
}

impl ContextRequest {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::File,
            locator: path.into(),
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Command,
            locator: command.into(),
        }
    }

    pub fn diff(range: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Diff,
            locator: range.into(),
        }
    }

    pub fn tree(path: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Tree,
            locator: path.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Text,
            locator: text.into(),
        }
    }
}

/// The request kinds the collector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Read a file's contents
    File,
    /// Execute a shell command and capture its output
    Command,
    /// Run `git diff` over the given range or paths
    Diff,
    /// List a directory tree
    Tree,
    /// Pass caller-supplied text through verbatim
    Text,
}

impl RequestKind {
    fn fragment_kind(&self) -> FragmentKind {
        match self {
            Self::File => FragmentKind::FileContent,
            Self::Command => FragmentKind::CommandOutput,
            Self::Diff => FragmentKind::Diff,
            Self::Tree => FragmentKind::DirectoryTree,
            Self::Text => FragmentKind::FreeText,
        }
    }
}

/// The outcome of one collection pass: collected fragments plus the
/// requests that failed. Failures degrade gracefully — they are surfaced
/// here, not propagated.
#[derive(Debug, Default)]
pub struct CollectionReport {
    /// Successfully collected fragments, in request order
    pub fragments: Vec<ContextFragment>,

    /// Requests that failed, with their errors
    pub failures: Vec<(ContextRequest, CollectError)>,
}

impl CollectionReport {
    /// Total estimated tokens across collected fragments.
    pub fn total_tokens(&self) -> usize {
        self.fragments.iter().map(|f| f.token_estimate).sum()
    }
}

/// The context collector. Stateless apart from its ceilings.
pub struct Collector {
    /// Per-fragment byte ceiling
    fragment_bytes: usize,

    /// Aggregate byte ceiling across one collection pass
    aggregate_bytes: usize,

    /// Working directory for commands and relative paths.
    /// `None` inherits the process working directory.
    workdir: Option<PathBuf>,
}

impl Collector {
    /// Create a collector with the given ceilings.
    pub fn new(fragment_bytes: usize, aggregate_bytes: usize) -> Self {
        Self {
            fragment_bytes,
            aggregate_bytes,
            workdir: None,
        }
    }

    /// Run commands and resolve relative paths under `dir` instead of the
    /// process working directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Collect all requests. Each request either yields a fragment or a
    /// recorded failure; neither outcome affects the other requests.
    pub async fn collect(&self, requests: &[ContextRequest]) -> CollectionReport {
        let mut report = CollectionReport::default();
        let mut remaining = self.aggregate_bytes;

        for request in requests {
            match self.collect_one(request).await {
                Ok(content) => {
                    let ceiling = self.fragment_bytes.min(remaining);
                    let (content, truncated) = clamp(content, ceiling);
                    remaining = remaining.saturating_sub(content.len());

                    let mut fragment = ContextFragment::new(
                        request.kind.fragment_kind(),
                        request.locator.clone(),
                        content,
                    );
                    if truncated {
                        fragment = fragment.truncated();
                    }
                    report.fragments.push(fragment);
                }
                Err(e) => {
                    warn!(locator = %request.locator, error = %e, "Context request failed");
                    report.failures.push((request.clone(), e));
                }
            }
        }

        debug!(
            fragments = report.fragments.len(),
            failures = report.failures.len(),
            tokens = report.total_tokens(),
            "Collection pass complete"
        );
        report
    }

    async fn collect_one(&self, request: &ContextRequest) -> Result<String, CollectError> {
        match request.kind {
            RequestKind::File => self.read_file(&request.locator).await,
            RequestKind::Command => self.run_command(&request.locator).await,
            RequestKind::Diff => {
                self.run_command(&format!("git diff {}", request.locator))
                    .await
            }
            RequestKind::Tree => self.list_tree(&request.locator),
            RequestKind::Text => Ok(request.locator.clone()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.workdir {
            Some(dir) if Path::new(path).is_relative() => dir.join(path),
            _ => PathBuf::from(path),
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, CollectError> {
        let resolved = self.resolve(path);
        tokio::fs::read_to_string(&resolved).await.map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::NotFound => CollectError::NotFound(path.to_string()),
                std::io::ErrorKind::PermissionDenied => {
                    CollectError::PermissionDenied(path.to_string())
                }
                _ => CollectError::Io {
                    source_path: path.to_string(),
                    message: e.to_string(),
                },
            }
        })
    }

    async fn run_command(&self, command: &str) -> Result<String, CollectError> {
        debug!(command = %command, "Executing context command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| CollectError::Io {
            source_path: command.to_string(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(CollectError::CommandFailed {
                command: command.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.is_empty() {
            Ok(stdout)
        } else {
            Ok(format!("{stdout}\n[stderr]: {stderr}"))
        }
    }

    /// List a directory recursively, one path per line, depth-first and
    /// sorted at every level so identical trees always render identically.
    fn list_tree(&self, path: &str) -> Result<String, CollectError> {
        let root = self.resolve(path);
        if !root.exists() {
            return Err(CollectError::NotFound(path.to_string()));
        }

        let mut lines = Vec::new();
        walk_tree(&root, 0, path, &mut lines)?;
        Ok(lines.join("\n"))
    }
}

/// Depth-first walk, entries sorted at every level.
fn walk_tree(
    dir: &Path,
    depth: usize,
    locator: &str,
    lines: &mut Vec<String>,
) -> Result<(), CollectError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CollectError::PermissionDenied(locator.to_string())
            }
            _ => CollectError::Io {
                source_path: locator.to_string(),
                message: e.to_string(),
            },
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for entry in entries {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if entry.is_dir() {
            lines.push(format!("{}{}/", "  ".repeat(depth), name));
            walk_tree(&entry, depth + 1, locator, lines)?;
        } else {
            lines.push(format!("{}{}", "  ".repeat(depth), name));
        }
    }
    Ok(())
}

/// Cut `content` down to `ceiling` bytes (on a char boundary), appending
/// the truncation marker when anything was removed.
fn clamp(content: String, ceiling: usize) -> (String, bool) {
    if content.len() <= ceiling {
        return (content, false);
    }

    let mut cut = ceiling.saturating_sub(TRUNCATION_MARKER.len());
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = content[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    (truncated, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> Collector {
        Collector::new(65_536, 262_144)
    }

    #[tokio::test]
    async fn collect_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "print('hello')\n").unwrap();

        let report = collector()
            .with_workdir(dir.path())
            .collect(&[ContextRequest::file("a.py")])
            .await;

        assert!(report.failures.is_empty());
        assert_eq!(report.fragments.len(), 1);
        let frag = &report.fragments[0];
        assert_eq!(frag.kind, FragmentKind::FileContent);
        assert_eq!(frag.content, "print('hello')\n");
        assert_eq!(frag.provenance.source, "a.py");
        assert!(!frag.provenance.truncated);
    }

    #[tokio::test]
    async fn missing_file_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), "content").unwrap();

        let report = collector()
            .with_workdir(dir.path())
            .collect(&[
                ContextRequest::file("missing.txt"),
                ContextRequest::file("real.txt"),
            ])
            .await;

        // The failed request never aborts the rest
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].1, CollectError::NotFound(_)));
        assert_eq!(report.fragments.len(), 1);
        assert_eq!(report.fragments[0].content, "content");
    }

    #[tokio::test]
    async fn command_output_captured() {
        let report = collector()
            .collect(&[ContextRequest::command("echo collected")])
            .await;

        assert!(report.failures.is_empty());
        assert_eq!(report.fragments.len(), 1);
        assert_eq!(report.fragments[0].kind, FragmentKind::CommandOutput);
        assert!(report.fragments[0].content.contains("collected"));
    }

    #[tokio::test]
    async fn failing_command_recorded() {
        let report = collector()
            .collect(&[ContextRequest::command("exit 3")])
            .await;

        assert_eq!(report.fragments.len(), 0);
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0].1 {
            CollectError::CommandFailed { exit_code, .. } => assert_eq!(*exit_code, 3),
            other => panic!("Expected CommandFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_fragment_truncated_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(1000)).unwrap();

        let report = Collector::new(100, 262_144)
            .with_workdir(dir.path())
            .collect(&[ContextRequest::file("big.txt")])
            .await;

        assert_eq!(report.fragments.len(), 1);
        let frag = &report.fragments[0];
        assert!(frag.content.len() <= 100);
        assert!(frag.content.ends_with("[truncated]"));
        assert!(frag.provenance.truncated);
    }

    #[tokio::test]
    async fn aggregate_ceiling_enforced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "a".repeat(80)).unwrap();
        std::fs::write(dir.path().join("two.txt"), "b".repeat(80)).unwrap();

        let report = Collector::new(100, 120)
            .with_workdir(dir.path())
            .collect(&[
                ContextRequest::file("one.txt"),
                ContextRequest::file("two.txt"),
            ])
            .await;

        // Second fragment clamped to what remains of the aggregate budget,
        // with the truncation recorded — never silently dropped
        assert_eq!(report.fragments.len(), 2);
        assert!(!report.fragments[0].provenance.truncated);
        assert!(report.fragments[1].provenance.truncated);
        let total: usize = report.fragments.iter().map(|f| f.content.len()).sum();
        assert!(total <= 120);
    }

    #[tokio::test]
    async fn directory_tree_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let c = collector().with_workdir(dir.path());
        let first = c.collect(&[ContextRequest::tree(".")]).await;
        let second = c.collect(&[ContextRequest::tree(".")]).await;

        assert_eq!(first.fragments[0].content, second.fragments[0].content);
        assert!(first.fragments[0].content.contains("README.md"));
        assert!(first.fragments[0].content.contains("src/"));
    }

    #[tokio::test]
    async fn free_text_passes_through() {
        let report = collector()
            .collect(&[ContextRequest::text("remember: tabs, not spaces")])
            .await;
        assert_eq!(report.fragments[0].kind, FragmentKind::FreeText);
        assert_eq!(report.fragments[0].content, "remember: tabs, not spaces");
    }

    #[test]
    fn clamp_is_noop_under_ceiling() {
        let (content, truncated) = clamp("short".into(), 100);
        assert_eq!(content, "short");
        assert!(!truncated);
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let (content, truncated) = clamp("héllo wörld".repeat(20), 30);
        assert!(truncated);
        assert!(content.len() <= 30);
        assert!(content.ends_with("[truncated]"));
    }
}
