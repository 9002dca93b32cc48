//! Progress emission for a single run

use insight_core::{ProgressCallback, ProgressEvent, ProgressPhase};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Emits phase-ordered progress events through the caller's callback.
///
/// Dropping the callback silences the stream entirely; the engine never
/// depends on events being observed.
pub struct ProgressEmitter {
    callback: Option<ProgressCallback>,
    completed: AtomicUsize,
    total: usize,
}

impl ProgressEmitter {
    pub fn new(callback: Option<ProgressCallback>, total: usize) -> Self {
        Self {
            callback,
            completed: AtomicUsize::new(0),
            total,
        }
    }

    pub fn emit(&self, phase: ProgressPhase, message: impl Into<String>, detector: Option<&str>) {
        let Some(callback) = &self.callback else {
            return;
        };
        callback(ProgressEvent {
            phase,
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total,
            message: message.into(),
            detector: detector.map(str::to_string),
        });
    }

    /// Record one finished detector and emit the matching event
    pub fn detector_done(&self, name: &str) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.emit(
            ProgressPhase::RunDetectors,
            format!("{name} finished"),
            Some(name),
        );
    }
}
