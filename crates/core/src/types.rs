//! Shared data types for the detector engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Severity of a reported issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single finding produced by a detector.
///
/// The `detector` field is attributed by the orchestrator when results are
/// merged; detectors themselves may leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub file: PathBuf,
    pub line: u32,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub detector: String,
}

impl Issue {
    pub fn new(
        file: impl Into<PathBuf>,
        line: u32,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            severity,
            message: message.into(),
            detector: String::new(),
        }
    }
}

/// One unit of dispatched work: run a detector against a target path.
///
/// Immutable once dispatched, consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub detector: String,
    pub target: PathBuf,
    pub priority: u8,
}

impl Task {
    pub fn new(detector: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            detector: detector.into(),
            target: target.into(),
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Outcome of a single task execution.
///
/// Exactly one of success, `crashed` or `timed_out` holds for any result
/// returned by the pool.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub detector: String,
    pub issues: Vec<Issue>,
    pub errors: Vec<String>,
    pub crashed: bool,
    pub timed_out: bool,
    pub duration: Duration,
}

impl TaskResult {
    pub fn completed(detector: impl Into<String>, issues: Vec<Issue>, duration: Duration) -> Self {
        Self {
            detector: detector.into(),
            issues,
            errors: Vec::new(),
            crashed: false,
            timed_out: false,
            duration,
        }
    }

    pub fn failed(detector: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            detector: detector.into(),
            issues: Vec::new(),
            errors: vec![error.into()],
            crashed: false,
            timed_out: false,
            duration,
        }
    }

    pub fn crashed(detector: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            detector: detector.into(),
            issues: Vec::new(),
            errors: vec![error.into()],
            crashed: true,
            timed_out: false,
            duration,
        }
    }

    pub fn timed_out(detector: impl Into<String>, duration: Duration) -> Self {
        Self {
            detector: detector.into(),
            issues: Vec::new(),
            errors: Vec::new(),
            crashed: false,
            timed_out: true,
            duration,
        }
    }

    /// True when the task ran to completion without crash or timeout.
    ///
    /// A completed task may still carry detector errors; those contribute
    /// zero issues but are not pool-level failures.
    pub fn succeeded(&self) -> bool {
        !self.crashed && !self.timed_out
    }
}

/// Phases of a run, emitted in a fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressPhase {
    CollectFiles,
    RunDetectors,
    AggregateResults,
    Complete,
}

/// A progress record streamed to the caller. Ephemeral, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub completed: usize,
    pub total: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
}

/// Callback invoked for every progress event
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Per-run input supplied by the caller. Read-only for the duration of the
/// run; workers never see it directly.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub workspace_root: PathBuf,
    /// Detector names to run; `None` means every registered detector
    pub detector_names: Option<Vec<String>>,
    pub on_progress: Option<ProgressCallback>,
    /// Cancellation flag: flipping the sender to `true` aborts the
    /// orchestrator's wait, not the workers themselves.
    pub cancel: Option<tokio::sync::watch::Receiver<bool>>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workspace_root", &self.workspace_root)
            .field("detector_names", &self.detector_names)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            detector_names: None,
            on_progress: None,
            cancel: None,
        }
    }
}
