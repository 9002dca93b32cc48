//! Execution strategies
//!
//! Every strategy implements the same contract: given a workspace, a list
//! of detector names and an optional file restriction, produce one
//! [`TaskResult`] per detector. A strategy never fails because a single
//! detector failed; detector-level problems are carried inside the
//! results.

use crate::pool::WorkerPool;
use crate::progress::ProgressEmitter;
use async_trait::async_trait;
use insight_core::{DetectorRegistry, EngineConfig, Result, TaskResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod batched;
mod file_parallel;
mod pooled;
mod sequential;

pub use batched::BatchedStrategy;
pub use file_parallel::FileParallelStrategy;
pub use pooled::{PoolMode, PooledStrategy};
pub use sequential::SequentialStrategy;

/// Work order handed to a strategy by the orchestrator
#[derive(Debug, Clone)]
pub struct StrategyInput {
    pub workspace_root: PathBuf,
    /// Detectors to run, in caller order
    pub detector_names: Vec<String>,
    /// File restriction for incremental runs; empty means the whole
    /// workspace
    pub files: Vec<PathBuf>,
}

impl StrategyInput {
    /// The targets each detector should analyze
    pub(crate) fn targets(&self) -> Vec<PathBuf> {
        if self.files.is_empty() {
            vec![self.workspace_root.clone()]
        } else {
            self.files
                .iter()
                .map(|f| {
                    if f.is_absolute() {
                        f.clone()
                    } else {
                        self.workspace_root.join(f)
                    }
                })
                .collect()
        }
    }
}

/// Common contract over execution strategies
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the requested detectors and return one result per detector, in
    /// caller order.
    async fn run_detectors(
        &self,
        input: &StrategyInput,
        progress: &ProgressEmitter,
    ) -> Result<Vec<TaskResult>>;
}

/// Concurrency modes the orchestrator can be built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMode {
    Sequential,
    Batched,
    Pooled,
    FileParallel,
}

/// Create a strategy for the given mode
pub fn create_strategy(
    mode: StrategyMode,
    registry: Arc<DetectorRegistry>,
    config: &EngineConfig,
    pool: Arc<WorkerPool>,
) -> Box<dyn ExecutionStrategy> {
    match mode {
        StrategyMode::Sequential => Box::new(SequentialStrategy::new(registry, config)),
        StrategyMode::Batched => Box::new(BatchedStrategy::new(registry, config)),
        StrategyMode::Pooled => Box::new(PooledStrategy::new(pool, registry, config)),
        StrategyMode::FileParallel => Box::new(FileParallelStrategy::new(pool, registry, config)),
    }
}

/// Merge per-target results for one detector into a single result.
///
/// Issues and errors accumulate; the crash and timeout flags only hold
/// when every target ended that way, so a detector that produced output
/// for some files is not discarded wholesale.
pub(crate) fn merge_results(detector: &str, results: Vec<TaskResult>) -> TaskResult {
    if results.is_empty() {
        return TaskResult::completed(detector, Vec::new(), Duration::ZERO);
    }

    let all_crashed = results.iter().all(|r| r.crashed);
    let all_timed_out = results.iter().all(|r| r.timed_out);

    let mut merged = TaskResult {
        detector: detector.to_string(),
        issues: Vec::new(),
        errors: Vec::new(),
        crashed: all_crashed,
        timed_out: all_timed_out,
        duration: Duration::ZERO,
    };
    for result in results {
        merged.issues.extend(result.issues);
        merged.errors.extend(result.errors);
        merged.duration += result.duration;
        if result.timed_out {
            merged.errors.push(format!("{detector} timed out on a target"));
        }
    }
    merged
}
