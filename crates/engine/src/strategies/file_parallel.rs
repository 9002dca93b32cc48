//! File-granular execution strategy

use super::{BatchedStrategy, ExecutionStrategy, PoolMode, PooledStrategy, StrategyInput};
use crate::pool::WorkerPool;
use crate::progress::ProgressEmitter;
use async_trait::async_trait;
use insight_core::{DetectorRegistry, EngineConfig, Result, Task, TaskResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Directories never worth descending into
const SKIPPED_DIRS: [&str; 3] = ["node_modules", "target", "dist"];

/// Partitions work at file granularity: one pool task per detector×file.
///
/// Pays off when a single slow detector dominates the run, since its
/// files spread across all workers instead of serializing behind one
/// task. Pool and timeout semantics are identical to the pooled strategy,
/// applied per file.
pub struct FileParallelStrategy {
    pool: Arc<WorkerPool>,
    fallback: BatchedStrategy,
    mode: PoolMode,
}

impl FileParallelStrategy {
    pub fn new(
        pool: Arc<WorkerPool>,
        registry: Arc<DetectorRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let mode = match pool.initialize() {
            Ok(()) => PoolMode::Pooled,
            Err(e) => {
                tracing::warn!(error = %e, "worker pool initialization failed, using batched mode");
                PoolMode::Fallback
            }
        };
        Self {
            pool,
            fallback: BatchedStrategy::new(registry, config),
            mode,
        }
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }
}

/// Collect the analyzable files under a workspace, skipping hidden
/// directories and build output.
pub(crate) fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            let hidden = entry.depth() > 0 && name.starts_with('.');
            !hidden && !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

#[async_trait]
impl ExecutionStrategy for FileParallelStrategy {
    fn name(&self) -> &'static str {
        "file-parallel"
    }

    async fn run_detectors(
        &self,
        input: &StrategyInput,
        progress: &ProgressEmitter,
    ) -> Result<Vec<TaskResult>> {
        if self.mode == PoolMode::Fallback {
            return self.fallback.run_detectors(input, progress).await;
        }

        let files = if input.files.is_empty() {
            collect_files(&input.workspace_root)
        } else {
            input.targets()
        };
        tracing::debug!(files = files.len(), "file-parallel run");

        PooledStrategy::run_via_pool(&self.pool, input, progress, |name| {
            files.iter().map(|f| Task::new(name, f.clone())).collect()
        })
        .await
    }
}
