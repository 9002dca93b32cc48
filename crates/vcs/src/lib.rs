//! Git change detection for incremental analysis
//!
//! Determines cheaply whether incremental analysis is possible and which
//! files changed since a recorded commit. Everything shells out to the
//! `git` binary; when git is unavailable the answers fail open to full
//! analysis, never to silence.

use insight_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Probes git state for a single workspace
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    workspace: PathBuf,
    /// Incremental mode is abandoned above this many changed files
    threshold: usize,
    /// Workspace-relative prefixes excluded from change detection
    ignored: Vec<PathBuf>,
}

impl GitChangeDetector {
    pub fn new(workspace: impl Into<PathBuf>, threshold: usize) -> Self {
        Self {
            workspace: workspace.into(),
            threshold,
            ignored: Vec::new(),
        }
    }

    /// Exclude paths under a workspace-relative prefix from change
    /// detection. Engine-owned state living inside the workspace, like an
    /// untracked result-cache directory, must not churn the incremental
    /// file set or count against the threshold.
    #[must_use]
    pub fn ignore_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.ignored.push(prefix.into());
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workspace)
            .output()
            .await
            .map_err(|e| Error::git(format!("failed to spawn git {}: {e}", args.join(" "))))?;

        if !output.status.success() {
            return Err(Error::git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::git(format!("git output is not valid UTF-8: {e}")))
    }

    /// Whether the workspace is inside a git work tree (and git exists)
    pub async fn is_git_available(&self) -> bool {
        match self.git(&["rev-parse", "--is-inside-work-tree"]).await {
            Ok(out) => out.trim() == "true",
            Err(e) => {
                tracing::debug!(error = %e, "git unavailable, incremental mode disabled");
                false
            }
        }
    }

    /// Current HEAD commit hash
    pub async fn current_head(&self) -> Result<String> {
        let out = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Files changed since the given commit, including untracked files.
    /// Paths are relative to the workspace root.
    pub async fn changed_files_since(&self, hash: &str) -> Result<Vec<PathBuf>> {
        let diff = self.git(&["diff", "--name-only", hash]).await?;
        let untracked = self
            .git(&["ls-files", "--others", "--exclude-standard"])
            .await?;

        let mut files: Vec<PathBuf> = diff
            .lines()
            .chain(untracked.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .filter(|path| !self.ignored.iter().any(|prefix| path.starts_with(prefix)))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// The file set an incremental run should restrict itself to.
    ///
    /// An empty list always means "analyze everything": no git, no known
    /// prior commit, or too many changes since it.
    pub async fn relevant_files(&self, last_hash: Option<&str>) -> Result<Vec<PathBuf>> {
        if !self.is_git_available().await {
            return Ok(Vec::new());
        }
        let Some(hash) = last_hash else {
            return Ok(Vec::new());
        };

        let changed = match self.changed_files_since(hash).await {
            Ok(files) => files,
            Err(e) => {
                // The recorded commit may no longer exist after a rebase
                tracing::warn!(hash = %hash, error = %e, "diff against recorded commit failed, running full analysis");
                return Ok(Vec::new());
            }
        };

        if changed.len() > self.threshold {
            tracing::debug!(
                changed = changed.len(),
                threshold = self.threshold,
                "too many changed files, running full analysis"
            );
            return Ok(Vec::new());
        }
        Ok(changed)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}
