//! Sequential execution strategy

use super::{merge_results, ExecutionStrategy, StrategyInput};
use crate::exec::run_contained;
use crate::progress::ProgressEmitter;
use async_trait::async_trait;
use insight_core::{DetectorRegistry, EngineConfig, Result, TaskResult};
use std::sync::Arc;
use std::time::Duration;

/// Baseline strategy: detectors run one at a time, in caller order.
///
/// Output ordering is fully deterministic for a fixed set of detector
/// outputs, which makes this the fallback of last resort and the mode
/// used by tests that assert on ordering.
pub struct SequentialStrategy {
    registry: Arc<DetectorRegistry>,
    timeout: Duration,
}

impl SequentialStrategy {
    pub fn new(registry: Arc<DetectorRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            timeout: config.task_timeout(),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn run_detectors(
        &self,
        input: &StrategyInput,
        progress: &ProgressEmitter,
    ) -> Result<Vec<TaskResult>> {
        let targets = input.targets();
        let mut results = Vec::with_capacity(input.detector_names.len());

        for name in &input.detector_names {
            let result = match self.registry.instantiate_by_name(name) {
                Ok(detector) => {
                    let mut per_target = Vec::with_capacity(targets.len());
                    for target in &targets {
                        per_target
                            .push(run_contained(Arc::clone(&detector), target.clone(), self.timeout).await);
                    }
                    merge_results(name, per_target)
                }
                Err(e) => TaskResult::failed(name.clone(), e.to_string(), Duration::ZERO),
            };
            progress.detector_done(name);
            results.push(result);
        }
        Ok(results)
    }
}
