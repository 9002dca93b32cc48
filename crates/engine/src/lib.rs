//! Detector orchestration engine
//!
//! Coordinates detector execution over a workspace: a bounded worker pool
//! with priority dispatch, timeout and crash containment; pluggable
//! execution strategies (sequential, batched, pooled, file-parallel); a
//! git-aware result cache consult/write-back cycle; and phase-ordered
//! progress streaming. The sole entry point is
//! [`Orchestrator::run`], which always returns a [`RunReport`] unless the
//! caller cancels or requests an unknown detector.

mod exec;

pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod strategies;

#[cfg(test)]
mod test_support;

pub use orchestrator::{DetectorOutcome, DetectorStatus, Orchestrator, RunReport};
pub use pool::WorkerPool;
pub use progress::ProgressEmitter;
pub use strategies::{
    BatchedStrategy, ExecutionStrategy, FileParallelStrategy, PoolMode, PooledStrategy,
    SequentialStrategy, StrategyInput, StrategyMode,
};
