//! Bounded worker pool with priority dispatch, timeout and crash isolation
//!
//! A fixed number of worker tasks drain a shared priority queue. Tasks with
//! higher priority are dispatched first; equal priorities dispatch in FIFO
//! submission order. Each task body runs through
//! [`crate::exec::run_contained`], so a panicking or hung detector costs
//! the pool nothing: the worker slot survives and the pool always holds
//! exactly `max_workers` live workers. The pool retries nothing — crash
//! and timeout containment is its whole job, recovery belongs to the
//! orchestrator.

use crate::exec::run_contained;
use insight_core::{DetectorRegistry, EngineConfig, Error, Result, Task, TaskResult};
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

struct QueuedTask {
    task: Task,
    seq: u64,
    reply: oneshot::Sender<TaskResult>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority wins, lower sequence breaks ties
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Fixed-size pool of isolated task executors
pub struct WorkerPool {
    registry: Arc<DetectorRegistry>,
    max_workers: usize,
    task_timeout: Duration,
    queue: Arc<Mutex<BinaryHeap<QueuedTask>>>,
    work_available: Arc<Semaphore>,
    seq: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl WorkerPool {
    pub fn new(registry: Arc<DetectorRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_workers: config.max_workers,
            task_timeout: config.task_timeout(),
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            work_available: Arc::new(Semaphore::new(0)),
            seq: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Spawn the worker tasks. Idempotent: calling twice is a no-op after
    /// the first successful initialization. Must run inside a tokio
    /// runtime.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.max_workers == 0 {
            return Err(Error::configuration(
                "worker pool requires at least one worker",
            ));
        }

        let mut workers = self.workers.lock();
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        for id in 0..self.max_workers {
            let queue = Arc::clone(&self.queue);
            let work_available = Arc::clone(&self.work_available);
            let registry = Arc::clone(&self.registry);
            let timeout = self.task_timeout;
            workers.push(tokio::spawn(worker_loop(
                id,
                queue,
                work_available,
                registry,
                timeout,
            )));
        }
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(workers = self.max_workers, "worker pool initialized");
        Ok(())
    }

    /// Submit a batch of tasks and wait until every one has completed,
    /// crashed or timed out. The returned map holds a result for every
    /// submitted task id, no exceptions.
    pub async fn process(&self, tasks: Vec<Task>) -> Result<HashMap<Uuid, TaskResult>> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(Error::PoolUnavailable {
                reason: "initialize() has not been called".to_string(),
            });
        }

        let mut receivers = Vec::with_capacity(tasks.len());
        let count = tasks.len();
        {
            let mut queue = self.queue.lock();
            for task in tasks {
                let (reply, rx) = oneshot::channel();
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                receivers.push((task.id, task.detector.clone(), rx));
                queue.push(QueuedTask { task, seq, reply });
            }
        }
        self.work_available.add_permits(count);

        let mut results = HashMap::with_capacity(count);
        for (id, detector, rx) in receivers {
            let result = match rx.await {
                Ok(result) => result,
                // Worker dropped the reply channel, e.g. shutdown mid-run
                Err(_) => TaskResult::crashed(
                    detector,
                    "worker terminated before returning a result",
                    Duration::ZERO,
                ),
            };
            results.insert(id, result);
        }
        Ok(results)
    }

    /// Run a single detector against a target. The result always carries
    /// `crashed` and `timed_out` flags, both false on success.
    pub async fn execute_detector(&self, name: &str, target: &Path) -> Result<TaskResult> {
        let task = Task::new(name, target);
        let id = task.id;
        let mut results = self.process(vec![task]).await?;
        results.remove(&id).ok_or_else(|| Error::PoolUnavailable {
            reason: "task result missing after process()".to_string(),
        })
    }

    /// Terminate all workers and drop queued work. Safe to call multiple
    /// times, and safe to call when `initialize()` never ran or failed.
    pub fn shutdown(&self) {
        self.initialized.store(false, Ordering::Release);
        self.work_available.close();
        self.queue.lock().clear();
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
        tracing::debug!("worker pool shut down");
    }

    /// Number of workers still running
    pub fn live_workers(&self) -> usize {
        self.workers.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<BinaryHeap<QueuedTask>>>,
    work_available: Arc<Semaphore>,
    registry: Arc<DetectorRegistry>,
    timeout: Duration,
) {
    loop {
        let permit = match work_available.acquire().await {
            Ok(permit) => permit,
            // Semaphore closed: shutdown
            Err(_) => break,
        };
        permit.forget();

        let Some(job) = queue.lock().pop() else {
            continue;
        };

        tracing::trace!(worker = id, task = %job.task.id, detector = %job.task.detector, "dispatching task");
        let result = match registry.instantiate_by_name(&job.task.detector) {
            Ok(detector) => run_contained(detector, job.task.target.clone(), timeout).await,
            Err(e) => TaskResult::failed(job.task.detector.clone(), e.to_string(), Duration::ZERO),
        };
        let _ = job.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        registry_with, PanickingDetector, RecordingDetector, SleepDetector, StaticDetector,
    };
    use insight_core::DetectorKind;
    use std::time::Instant;

    fn config(max_workers: usize, timeout: Duration) -> EngineConfig {
        EngineConfig {
            max_workers,
            task_timeout_secs: timeout.as_secs().max(1),
            ..EngineConfig::default()
        }
    }

    fn pool_with_timeout(
        registry: Arc<DetectorRegistry>,
        max_workers: usize,
        timeout: Duration,
    ) -> WorkerPool {
        let mut pool = WorkerPool::new(registry, &config(max_workers, Duration::from_secs(60)));
        pool.task_timeout = timeout;
        pool
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_task_gets_exactly_one_result() {
        let registry = registry_with(|r| {
            r.register(DetectorKind::Typescript, || {
                Arc::new(StaticDetector::new("typescript", 2))
            });
            r.register(DetectorKind::Eslint, || Arc::new(PanickingDetector::new("eslint")));
        });
        let pool = WorkerPool::new(Arc::new(registry), &config(2, Duration::from_secs(60)));
        pool.initialize().unwrap();

        let tasks: Vec<Task> = (0..5)
            .map(|i| {
                let name = if i % 2 == 0 { "typescript" } else { "eslint" };
                Task::new(name, format!("/ws/{i}"))
            })
            .collect();
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let results = pool.process(tasks).await.unwrap();
        assert_eq!(results.len(), 5);
        for id in ids {
            let result = results.get(&id).expect("missing result");
            // Exactly one terminal state
            let states =
                [result.succeeded(), result.crashed, result.timed_out]
                    .iter()
                    .filter(|b| **b)
                    .count();
            assert_eq!(states, 1);
        }
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_workers_run_five_sleeps_in_three_waves() {
        let registry = registry_with(|r| {
            r.register(DetectorKind::Typescript, || {
                Arc::new(SleepDetector::new("typescript", Duration::from_millis(100)))
            });
        });
        let pool = WorkerPool::new(Arc::new(registry), &config(2, Duration::from_secs(60)));
        pool.initialize().unwrap();

        let tasks: Vec<Task> = (0..5).map(|i| Task::new("typescript", format!("/f{i}"))).collect();
        let started = Instant::now();
        let results = pool.process(tasks).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 5);
        assert!(results.values().all(|r| r.succeeded()));
        assert!(
            elapsed >= Duration::from_millis(250),
            "finished too fast ({elapsed:?}), pool is wider than 2"
        );
        assert!(
            elapsed < Duration::from_millis(480),
            "finished too slowly ({elapsed:?}), pool did not parallelize"
        );
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_tasks_leave_the_pool_usable() {
        let registry = registry_with(|r| {
            r.register(DetectorKind::Typescript, || {
                Arc::new(SleepDetector::new("typescript", Duration::from_millis(200)))
            });
            r.register(DetectorKind::Eslint, || {
                Arc::new(StaticDetector::new("eslint", 1))
            });
        });
        let pool = pool_with_timeout(Arc::new(registry), 2, Duration::from_millis(50));
        pool.initialize().unwrap();

        let result = pool.execute_detector("typescript", Path::new("/ws")).await.unwrap();
        assert!(result.timed_out);
        assert!(result.issues.is_empty());
        assert!(!result.crashed);

        // Pool converges back to its full worker count and keeps working
        assert_eq!(pool.live_workers(), 2);
        let result = pool.execute_detector("eslint", Path::new("/ws")).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.issues.len(), 1);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_crash_is_contained_and_reported() {
        let registry = registry_with(|r| {
            r.register(DetectorKind::Eslint, || Arc::new(PanickingDetector::new("eslint")));
            r.register(DetectorKind::Typescript, || {
                Arc::new(StaticDetector::new("typescript", 3))
            });
        });
        let pool = WorkerPool::new(Arc::new(registry), &config(2, Duration::from_secs(60)));
        pool.initialize().unwrap();

        let crash = Task::new("eslint", "/ws");
        let ok = Task::new("typescript", "/ws");
        let (crash_id, ok_id) = (crash.id, ok.id);

        let results = pool.process(vec![crash, ok]).await.unwrap();
        let crashed = &results[&crash_id];
        assert!(crashed.crashed);
        assert!(crashed.issues.is_empty());
        assert!(!crashed.errors.is_empty());

        let fine = &results[&ok_id];
        assert!(fine.succeeded());
        assert_eq!(fine.issues.len(), 3);

        assert_eq!(pool.live_workers(), 2);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_follows_priority_then_fifo() {
        let recorder = RecordingDetector::new("typescript");
        let order = recorder.order();
        let registry = registry_with(move |r| {
            let recorder = recorder.clone();
            r.register(DetectorKind::Typescript, move || Arc::new(recorder.clone()));
        });
        let pool = WorkerPool::new(Arc::new(registry), &config(1, Duration::from_secs(60)));
        pool.initialize().unwrap();

        let tasks = vec![
            Task::new("typescript", "/a").with_priority(0),
            Task::new("typescript", "/b").with_priority(5),
            Task::new("typescript", "/c").with_priority(5),
            Task::new("typescript", "/d").with_priority(9),
        ];
        pool.process(tasks).await.unwrap();

        let seen = order.lock().clone();
        assert_eq!(seen, vec!["/d", "/b", "/c", "/a"]);
        pool.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_safe_before_init() {
        let registry = registry_with(|_| {});
        let pool = WorkerPool::new(Arc::new(registry), &config(2, Duration::from_secs(60)));

        // Never initialized
        pool.shutdown();
        pool.shutdown();

        let err = pool.process(vec![Task::new("typescript", "/ws")]).await;
        assert!(matches!(err, Err(Error::PoolUnavailable { .. })));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let registry = registry_with(|r| {
            r.register(DetectorKind::Typescript, || {
                Arc::new(StaticDetector::new("typescript", 0))
            });
        });
        let pool = WorkerPool::new(Arc::new(registry), &config(3, Duration::from_secs(60)));
        pool.initialize().unwrap();
        pool.initialize().unwrap();
        assert_eq!(pool.live_workers(), 3);
        pool.shutdown();
    }

    #[tokio::test]
    async fn unknown_detectors_fail_without_crashing() {
        let registry = registry_with(|_| {});
        let pool = WorkerPool::new(Arc::new(registry), &config(1, Duration::from_secs(60)));
        pool.initialize().unwrap();

        let result = pool.execute_detector("typescript", Path::new("/ws")).await.unwrap();
        assert!(!result.crashed);
        assert!(!result.timed_out);
        assert!(!result.errors.is_empty());
        assert!(result.issues.is_empty());
        pool.shutdown();
    }
}
