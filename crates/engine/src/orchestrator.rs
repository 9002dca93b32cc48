//! Run orchestration: cache consult, incremental narrowing, strategy
//! dispatch and result aggregation.
//!
//! The orchestrator owns the run lifecycle. It resolves detector names,
//! asks the change detector whether the run can be narrowed to changed
//! files, serves unexpired cached results, hands the remainder to the
//! configured execution strategy and merges everything into one
//! [`RunReport`]. A run always completes with a report unless the caller
//! cancels or supplies an unknown detector name; individual detector
//! failures are carried in the per-detector statuses.

use crate::pool::WorkerPool;
use crate::progress::ProgressEmitter;
use crate::strategies::{create_strategy, ExecutionStrategy, StrategyInput, StrategyMode};
use insight_cache::{generate_key, ResultCache};
use insight_core::{
    DetectorRegistry, EngineConfig, Error, ExecutionContext, Issue, ProgressPhase, Result,
    TaskResult,
};
use insight_vcs::GitChangeDetector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Cache key recording the commit the last completed run was computed
/// against. Carries no git hash of its own so bulk invalidation never
/// removes it.
const META_LAST_HEAD_KEY: &str = "insight:meta:last-head";

/// How a detector's contribution to a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorOutcome {
    /// Ran to completion and contributed its issues
    Completed,
    /// Completed but reported errors; contributed whatever it produced
    Failed,
    /// Panicked; contributed nothing
    Crashed,
    /// Exceeded its wall-clock budget; contributed nothing
    TimedOut,
    /// Served from the result cache without running
    Cached,
}

/// Per-detector entry in a [`RunReport`]
#[derive(Debug, Clone)]
pub struct DetectorStatus {
    pub name: String,
    pub issue_count: usize,
    pub duration: Duration,
    pub outcome: DetectorOutcome,
}

/// Aggregate outcome of one orchestrated run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Union of all issues from non-crashed, non-timed-out detectors,
    /// each tagged with its originating detector
    pub issues: Vec<Issue>,
    /// One status per requested detector, in caller order
    pub statuses: Vec<DetectorStatus>,
    /// Whether the run was narrowed to files changed since the last run
    pub incremental: bool,
    pub duration: Duration,
}

/// Ties the registry, cache, change detector and an execution strategy
/// into the single `run()` entry point.
pub struct Orchestrator {
    registry: Arc<DetectorRegistry>,
    config: EngineConfig,
    strategy: Box<dyn ExecutionStrategy>,
    cache: Option<Arc<ResultCache>>,
}

impl Orchestrator {
    /// Build an orchestrator with the given strategy mode. Pool-backed
    /// modes spawn their workers here, so construction must happen inside
    /// a tokio runtime.
    pub fn new(registry: Arc<DetectorRegistry>, config: EngineConfig, mode: StrategyMode) -> Self {
        let pool = Arc::new(WorkerPool::new(Arc::clone(&registry), &config));
        let strategy = create_strategy(mode, Arc::clone(&registry), &config, pool);
        Self {
            registry,
            config,
            strategy,
            cache: None,
        }
    }

    /// Build an orchestrator around an explicitly constructed strategy,
    /// for callers that own their pool or implement a custom strategy.
    pub fn with_strategy(
        registry: Arc<DetectorRegistry>,
        config: EngineConfig,
        strategy: Box<dyn ExecutionStrategy>,
    ) -> Self {
        Self {
            registry,
            config,
            strategy,
            cache: None,
        }
    }

    /// Attach a result cache. Without one every run recomputes everything.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the requested detectors and aggregate their results.
    ///
    /// Cancellation aborts this wait, not the workers; in-flight tasks run
    /// on until their own timeout and are then discarded.
    pub async fn run(&self, context: ExecutionContext) -> Result<RunReport> {
        let span = tracing::info_span!(
            "run",
            workspace = %context.workspace_root.display(),
            strategy = self.strategy.name(),
        );
        let work = self.run_inner(&context).instrument(span);

        let Some(mut cancel) = context.cancel.clone() else {
            return work.await;
        };
        if *cancel.borrow() {
            return Err(Error::Cancelled);
        }

        tokio::pin!(work);
        loop {
            tokio::select! {
                result = &mut work => return result,
                changed = cancel.changed() => match changed {
                    Ok(()) if *cancel.borrow() => {
                        tracing::info!("run cancelled by caller");
                        return Err(Error::Cancelled);
                    }
                    Ok(()) => {}
                    // Sender dropped: cancellation can no longer fire
                    Err(_) => return work.await,
                },
            }
        }
    }

    async fn run_inner(&self, context: &ExecutionContext) -> Result<RunReport> {
        let started = Instant::now();
        let workspace = context.workspace_root.as_path();

        let names = match &context.detector_names {
            Some(names) => {
                self.registry.resolve(names)?;
                names.clone()
            }
            None => self.registry.registered_names(),
        };
        let progress = ProgressEmitter::new(context.on_progress.clone(), names.len());

        progress.emit(ProgressPhase::CollectFiles, "collecting changed files", None);
        let mut git = GitChangeDetector::new(workspace, self.config.incremental_threshold);
        if let Some(cache) = &self.cache {
            // An in-workspace cache directory is untracked engine state,
            // not a change worth analyzing
            let dir = cache.directory();
            git = git.ignore_prefix(dir.strip_prefix(workspace).unwrap_or(dir));
        }
        let (head, prev_head, files) = self.collect_changes(&git).await;
        let incremental = !files.is_empty();
        tracing::debug!(
            detectors = names.len(),
            incremental,
            changed_files = files.len(),
            "run starting"
        );

        // Consult the cache. On a full run with a known commit, unexpired
        // per-detector entries are served without running the detector. On
        // an incremental run the prior full results are fetched so issues
        // in unchanged files can be carried over; a detector with no prior
        // entry runs over the whole workspace instead, since narrowing it
        // would lose coverage the cache can no longer supply.
        let mut served: HashMap<String, Vec<Issue>> = HashMap::new();
        let mut previous: HashMap<String, Vec<Issue>> = HashMap::new();
        let mut narrowed: Vec<String> = Vec::new();
        let mut full_run: Vec<String> = Vec::new();

        if let (Some(cache), Some(head)) = (&self.cache, head.as_deref()) {
            if incremental {
                for name in &names {
                    let prior = match prev_head.as_deref() {
                        Some(prev) => {
                            let key = self.result_key(workspace, prev, name);
                            cache.get::<Vec<Issue>>(&key).await
                        }
                        None => None,
                    };
                    match prior {
                        Some(issues) => {
                            previous.insert(name.clone(), issues);
                            narrowed.push(name.clone());
                        }
                        None => {
                            tracing::debug!(
                                detector = %name,
                                "no prior cached result, analyzing the whole workspace"
                            );
                            full_run.push(name.clone());
                        }
                    }
                }
            } else {
                for name in &names {
                    let key = self.result_key(workspace, head, name);
                    match cache.get::<Vec<Issue>>(&key).await {
                        Some(issues) => {
                            progress.detector_done(name);
                            served.insert(name.clone(), issues);
                        }
                        None => full_run.push(name.clone()),
                    }
                }
            }
        } else {
            full_run = names.clone();
        }

        let mut by_name: HashMap<String, TaskResult> = HashMap::new();
        for (detectors, restriction) in [(narrowed, files.clone()), (full_run, Vec::new())] {
            if detectors.is_empty() {
                continue;
            }
            let input = StrategyInput {
                workspace_root: workspace.to_path_buf(),
                detector_names: detectors,
                files: restriction,
            };
            for result in self.strategy.run_detectors(&input, &progress).await? {
                by_name.insert(result.detector.clone(), result);
            }
        }

        progress.emit(ProgressPhase::AggregateResults, "aggregating results", None);
        let mut report = RunReport {
            incremental,
            ..RunReport::default()
        };

        for name in &names {
            if let Some(issues) = served.remove(name) {
                let status = DetectorStatus {
                    name: name.clone(),
                    issue_count: issues.len(),
                    duration: Duration::ZERO,
                    outcome: DetectorOutcome::Cached,
                };
                report.issues.extend(tagged(issues, name));
                report.statuses.push(status);
                continue;
            }

            // Strategy contract: one result per requested detector
            let Some(result) = by_name.remove(name) else {
                report.statuses.push(DetectorStatus {
                    name: name.clone(),
                    issue_count: 0,
                    duration: Duration::ZERO,
                    outcome: DetectorOutcome::Failed,
                });
                continue;
            };

            let outcome = if result.crashed {
                DetectorOutcome::Crashed
            } else if result.timed_out {
                DetectorOutcome::TimedOut
            } else if !result.errors.is_empty() {
                DetectorOutcome::Failed
            } else {
                DetectorOutcome::Completed
            };
            for error in &result.errors {
                tracing::warn!(detector = %name, %error, "detector reported an error");
            }

            let succeeded = result.succeeded();
            let mut issues = if succeeded { result.issues } else { Vec::new() };
            if incremental && succeeded {
                if let Some(prior) = previous.remove(name) {
                    issues.extend(retained(prior, &files, workspace));
                }
            }

            if outcome == DetectorOutcome::Completed {
                if let (Some(cache), Some(head)) = (&self.cache, head.as_deref()) {
                    let key = self.result_key(workspace, head, name);
                    if let Err(e) = cache
                        .set(&key, &issues, None, Some(head.to_string()))
                        .await
                    {
                        tracing::warn!(detector = %name, error = %e, "skipping cache write-back");
                    }
                }
            }

            report.statuses.push(DetectorStatus {
                name: name.clone(),
                issue_count: issues.len(),
                duration: result.duration,
                outcome,
            });
            report.issues.extend(tagged(issues, name));
        }

        if let (Some(cache), Some(head)) = (&self.cache, head.as_deref()) {
            if let Some(prev) = prev_head.as_deref() {
                if prev != head {
                    if let Err(e) = cache.invalidate_by_git_hash(prev).await {
                        tracing::warn!(error = %e, "failed to invalidate superseded commit entries");
                    }
                }
            }
            if let Err(e) = cache
                .set(META_LAST_HEAD_KEY, &head.to_string(), None, None)
                .await
            {
                tracing::warn!(error = %e, "failed to record run commit");
            }
        }

        report.duration = started.elapsed();
        progress.emit(
            ProgressPhase::Complete,
            format!("{} issues found", report.issues.len()),
            None,
        );
        tracing::info!(
            issues = report.issues.len(),
            duration_ms = report.duration.as_millis() as u64,
            "run complete"
        );
        Ok(report)
    }

    /// Probe git state: current commit, commit of the last completed run,
    /// and the changed files an incremental run should restrict itself to.
    /// Every failure degrades to a full, uncached run.
    async fn collect_changes(
        &self,
        git: &GitChangeDetector,
    ) -> (Option<String>, Option<String>, Vec<PathBuf>) {
        let Some(cache) = &self.cache else {
            return (None, None, Vec::new());
        };
        if !git.is_git_available().await {
            return (None, None, Vec::new());
        }

        let head = match git.current_head().await {
            Ok(head) => Some(head),
            Err(e) => {
                tracing::debug!(error = %e, "no resolvable HEAD, caching disabled for this run");
                None
            }
        };
        let prev_head: Option<String> = cache.get(META_LAST_HEAD_KEY).await;
        let files = match git.relevant_files(prev_head.as_deref()).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "change detection failed, running full analysis");
                Vec::new()
            }
        };
        (head, prev_head, files)
    }

    fn result_key(&self, workspace: &Path, head: &str, name: &str) -> String {
        let version = self
            .registry
            .instantiate_by_name(name)
            .map(|d| d.version())
            .unwrap_or(1)
            .to_string();
        let workspace = workspace.display().to_string();
        let digest = generate_key(&[&workspace, head, name, &version]);
        format!("insight:{name}:{digest}")
    }
}

fn tagged(issues: Vec<Issue>, detector: &str) -> impl Iterator<Item = Issue> + '_ {
    issues.into_iter().map(move |mut issue| {
        issue.detector = detector.to_string();
        issue
    })
}

/// Prior issues still valid after an incremental run: everything not
/// located in a changed file. Changed paths are workspace-relative, so
/// each is compared both as-is and resolved against the workspace root;
/// anything looser (a path-suffix match) would also discard issues in
/// unchanged files that merely share a file name.
fn retained(previous: Vec<Issue>, changed: &[PathBuf], workspace: &Path) -> Vec<Issue> {
    previous
        .into_iter()
        .filter(|issue| {
            !changed
                .iter()
                .any(|path| issue.file == *path || issue.file == workspace.join(path))
        })
        .collect()
}
