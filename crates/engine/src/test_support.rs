//! Shared detector doubles for engine tests

use async_trait::async_trait;
use insight_core::{Detector, DetectorRegistry, Error, Issue, Result, Severity};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Route test logs through the test harness's captured output
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("insight_engine=debug")
        .try_init();
}

pub(crate) fn registry_with<F>(build: F) -> DetectorRegistry
where
    F: FnOnce(&mut DetectorRegistry),
{
    let mut registry = DetectorRegistry::new();
    build(&mut registry);
    registry
}

/// Returns a fixed number of issues for any target
pub(crate) struct StaticDetector {
    name: &'static str,
    issue_count: usize,
}

impl StaticDetector {
    pub(crate) fn new(name: &'static str, issue_count: usize) -> Self {
        Self { name, issue_count }
    }
}

#[async_trait]
impl Detector for StaticDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, target: &Path) -> Result<Vec<Issue>> {
        Ok((0..self.issue_count)
            .map(|i| Issue::new(target, i as u32 + 1, Severity::Warning, format!("finding {i}")))
            .collect())
    }
}

/// Always reports a detector failure
pub(crate) struct FailingDetector {
    name: &'static str,
}

impl FailingDetector {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Detector for FailingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, _target: &Path) -> Result<Vec<Issue>> {
        Err(Error::detector(self.name, "analysis blew a fuse"))
    }
}

/// Panics mid-analysis, simulating a worker crash
pub(crate) struct PanickingDetector {
    name: &'static str,
}

impl PanickingDetector {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Detector for PanickingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, _target: &Path) -> Result<Vec<Issue>> {
        panic!("detector exploded");
    }
}

/// Sleeps for a fixed delay, then returns nothing
pub(crate) struct SleepDetector {
    name: &'static str,
    delay: Duration,
}

impl SleepDetector {
    pub(crate) fn new(name: &'static str, delay: Duration) -> Self {
        Self { name, delay }
    }
}

#[async_trait]
impl Detector for SleepDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, _target: &Path) -> Result<Vec<Issue>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

/// Records the order in which targets were analyzed
#[derive(Clone)]
pub(crate) struct RecordingDetector {
    name: &'static str,
    order: Arc<Mutex<Vec<String>>>,
}

impl RecordingDetector {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn order(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.order)
    }
}

#[async_trait]
impl Detector for RecordingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, target: &Path) -> Result<Vec<Issue>> {
        self.order.lock().push(target.display().to_string());
        Ok(Vec::new())
    }
}

/// Counts invocations, for cache-hit assertions
#[derive(Clone)]
pub(crate) struct CountingDetector {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    issue_count: usize,
}

impl CountingDetector {
    pub(crate) fn new(name: &'static str, issue_count: usize) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
            issue_count,
        }
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Detector for CountingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, target: &Path) -> Result<Vec<Issue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.issue_count)
            .map(|i| Issue::new(target, i as u32 + 1, Severity::Info, "counted"))
            .collect())
    }
}
