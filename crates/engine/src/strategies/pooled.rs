//! Worker-pool-backed execution strategy

use super::{merge_results, BatchedStrategy, ExecutionStrategy, StrategyInput};
use crate::pool::WorkerPool;
use crate::progress::ProgressEmitter;
use async_trait::async_trait;
use insight_core::{DetectorRegistry, EngineConfig, Result, Task, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Which execution path a pooled strategy settled on at construction.
///
/// Deciding once up front keeps the chosen mode observable instead of
/// hiding an exception-driven downgrade inside the run path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// Tasks dispatch to the worker pool
    Pooled,
    /// Pool initialization failed; batched concurrency is used instead
    Fallback,
}

/// Delegates each detector to the worker pool, falling back to the
/// batched strategy when the pool cannot be initialized. Pool failure is
/// an infrastructure problem, never a reason to fail the run.
pub struct PooledStrategy {
    pool: Arc<WorkerPool>,
    fallback: BatchedStrategy,
    mode: PoolMode,
}

impl PooledStrategy {
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

    pub(crate) async fn run_via_pool(
        pool: &WorkerPool,
        input: &StrategyInput,
        progress: &ProgressEmitter,
        tasks_for: impl Fn(&str) -> Vec<Task>,
    ) -> Result<Vec<TaskResult>> {
        // Remember which task ids belong to which detector so results can
        // be regrouped in caller order.
        let mut by_detector: Vec<(String, Vec<Uuid>)> = Vec::new();
        let mut all_tasks = Vec::new();
        for name in &input.detector_names {
            let tasks = tasks_for(name);
            by_detector.push((name.clone(), tasks.iter().map(|t| t.id).collect()));
            all_tasks.extend(tasks);
        }

        let mut completed = pool.process(all_tasks).await?;

        let mut results = Vec::with_capacity(by_detector.len());
        for (name, ids) in by_detector {
            let per_task: Vec<TaskResult> = ids
                .into_iter()
                .map(|id| {
                    completed.remove(&id).unwrap_or_else(|| {
                        TaskResult::crashed(
                            name.clone(),
                            "task result missing after process()",
                            Duration::ZERO,
                        )
                    })
                })
                .collect();
            let result = merge_results(&name, per_task);
            progress.detector_done(&name);
            results.push(result);
        }
        Ok(results)
    }
}

#[async_trait]
impl ExecutionStrategy for PooledStrategy {
    fn name(&self) -> &'static str {
        "pooled"
    }

    async fn run_detectors(
        &self,
        input: &StrategyInput,
        progress: &ProgressEmitter,
    ) -> Result<Vec<TaskResult>> {
        match self.mode {
            PoolMode::Fallback => self.fallback.run_detectors(input, progress).await,
            PoolMode::Pooled => {
                let targets = input.targets();
                Self::run_via_pool(&self.pool, input, progress, |name| {
                    targets.iter().map(|t| Task::new(name, t.clone())).collect()
                })
                .await
            }
        }
    }
}
