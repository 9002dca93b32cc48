//! Batched concurrent execution strategy

use super::{merge_results, ExecutionStrategy, StrategyInput};
use crate::exec::run_contained;
use crate::progress::ProgressEmitter;
use async_trait::async_trait;
use insight_core::{DetectorRegistry, EngineConfig, Result, TaskResult};
use std::sync::Arc;
use std::time::Duration;

/// Runs detectors in concurrent batches of `max_concurrency`.
///
/// Each batch is awaited as a whole with settled semantics: a crashing or
/// failing detector never aborts its siblings, it just contributes an
/// empty result.
pub struct BatchedStrategy {
    registry: Arc<DetectorRegistry>,
    timeout: Duration,
    max_concurrency: usize,
}

impl BatchedStrategy {
    pub fn new(registry: Arc<DetectorRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            timeout: config.task_timeout(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    async fn run_one(&self, name: &str, targets: &[std::path::PathBuf]) -> TaskResult {
        match self.registry.instantiate_by_name(name) {
            Ok(detector) => {
                let mut per_target = Vec::with_capacity(targets.len());
                for target in targets {
                    per_target
                        .push(run_contained(Arc::clone(&detector), target.clone(), self.timeout).await);
                }
                merge_results(name, per_target)
            }
            Err(e) => TaskResult::failed(name.to_string(), e.to_string(), Duration::ZERO),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for BatchedStrategy {
    fn name(&self) -> &'static str {
        "batched"
    }

    async fn run_detectors(
        &self,
        input: &StrategyInput,
        progress: &ProgressEmitter,
    ) -> Result<Vec<TaskResult>> {
        let targets = input.targets();
        let mut results = Vec::with_capacity(input.detector_names.len());

        for batch in input.detector_names.chunks(self.max_concurrency) {
            let futures: Vec<_> = batch.iter().map(|name| self.run_one(name, &targets)).collect();
            for result in futures::future::join_all(futures).await {
                progress.detector_done(&result.detector);
                results.push(result);
            }
        }
        Ok(results)
    }
}
