//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard cap on worker count, whatever the host reports
const MAX_WORKERS_CAP: usize = 16;

/// Tunable parameters for orchestration and the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of pool workers
    pub max_workers: usize,
    /// Wall-clock budget per task, in seconds
    pub task_timeout_secs: u64,
    /// Batch size for the batched (non-pool) parallel strategy
    pub max_concurrency: usize,
    /// Incremental analysis is abandoned above this many changed files
    pub incremental_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            task_timeout_secs: 60,
            max_concurrency: default_max_concurrency(),
            incremental_threshold: 50,
        }
    }
}

fn default_max_workers() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS_CAP)
}

fn default_max_concurrency() -> usize {
    num_cpus::get().clamp(1, 4)
}

impl EngineConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}
