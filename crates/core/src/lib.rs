//! Core types for the insight detector engine
//!
//! This crate holds the shared vocabulary of the engine: tasks and task
//! results, issues, progress events, the detector trait and its static
//! registry, engine-wide errors, and configuration.

pub mod config;
pub mod detector;
pub mod errors;
pub mod types;

pub use config::EngineConfig;
pub use detector::{Detector, DetectorCtor, DetectorKind, DetectorRegistry};
pub use errors::{Error, Result};
pub use types::{
    ExecutionContext, Issue, ProgressCallback, ProgressEvent, ProgressPhase, Severity, Task,
    TaskResult,
};
