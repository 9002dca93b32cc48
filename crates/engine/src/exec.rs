//! Contained execution of a single detector task
//!
//! Every detector invocation, whatever the strategy, goes through
//! [`run_contained`]: the detector runs in a freshly spawned task so that a
//! panic is caught at the boundary instead of unwinding into the engine,
//! and a wall-clock timeout aborts the spawned task. The caller always
//! gets a [`TaskResult`] back, never an error.

use insight_core::{Detector, TaskResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

pub(crate) async fn run_contained(
    detector: Arc<dyn Detector>,
    target: PathBuf,
    timeout: Duration,
) -> TaskResult {
    let name = detector.name().to_string();
    let started = Instant::now();

    let span = tracing::debug_span!("detect", detector = %name, target = %target.display());
    let handle = tokio::spawn(async move { detector.detect(&target).await }.instrument(span));
    let abort = handle.abort_handle();

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(issues))) => TaskResult::completed(name, issues, started.elapsed()),
        Ok(Ok(Err(e))) => {
            tracing::warn!(detector = %name, error = %e, "detector reported a failure");
            TaskResult::failed(name, e.to_string(), started.elapsed())
        }
        Ok(Err(join_err)) => {
            let message = panic_message(join_err);
            tracing::error!(detector = %name, message = %message, "detector crashed");
            TaskResult::crashed(name, message, started.elapsed())
        }
        Err(_) => {
            abort.abort();
            tracing::warn!(detector = %name, ?timeout, "detector timed out");
            TaskResult::timed_out(name, started.elapsed())
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "detector panicked".to_string()
        }
    } else {
        "detector task was aborted".to_string()
    }
}
