//! Fixed-size worker pool for image migrations
//!
//! Lifecycle: `Uninitialized -> Open (start) -> Draining (close) -> Closed`.
//! The per-worker rate limit is computed once in [`WorkerPool::start`] and
//! stays fixed for the lifetime of the pool.

use crate::concurrency::report::PoolReport;
use crate::error::{MigrateError, PoolError};
use crate::image::Image;
use crate::migration::{ImageMigrator, MigrationOutcome};
use crate::ratelimit::RateLimit;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Uninitialized,
    Open,
    Draining,
    Closed,
}

type JobResult = Result<MigrationOutcome, MigrateError>;

struct Job {
    image: Image,
    name: String,
    result: oneshot::Sender<JobResult>,
}

/// Resolves to the result of one submitted migration
pub struct MigrationHandle {
    image: String,
    result: oneshot::Receiver<JobResult>,
}

impl MigrationHandle {
    pub fn image(&self) -> &str {
        &self.image
    }

    pub async fn wait(self) -> Result<MigrationOutcome, PoolError> {
        match self.result.await {
            Ok(Err(MigrateError::Panicked(message))) => Err(PoolError::WorkerPanicked(message)),
            Ok(result) => result.map_err(PoolError::from),
            Err(_) => Err(PoolError::Dropped),
        }
    }
}

pub struct WorkerPool {
    size: usize,
    queue_capacity: usize,
    global_rate_limit: Option<RateLimit>,
    worker_rate_limit: Option<RateLimit>,
    state: PoolState,
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    report: Arc<Mutex<PoolReport>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            global_rate_limit: None,
            worker_rate_limit: None,
            state: PoolState::Uninitialized,
            sender: None,
            workers: Vec::new(),
            report: Arc::new(Mutex::new(PoolReport::default())),
        }
    }

    /// One worker per logical CPU
    pub fn with_default_size() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the global throughput budget shared by all workers.
    /// Only takes effect if called before [`start`](Self::start).
    pub fn configure(&mut self, global_rate_limit: Option<RateLimit>) {
        if self.state != PoolState::Uninitialized {
            tracing::warn!(
                state = ?self.state,
                "rate limit changed after start; running workers keep their current share"
            );
        }
        self.global_rate_limit = global_rate_limit;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn global_rate_limit(&self) -> Option<RateLimit> {
        self.global_rate_limit
    }

    /// Per-worker share fixed at start; `None` before start or when unthrottled
    pub fn worker_rate_limit(&self) -> Option<RateLimit> {
        self.worker_rate_limit
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(&mut self, migrator: Arc<dyn ImageMigrator>) -> Result<(), PoolError> {
        if self.state != PoolState::Uninitialized {
            return Err(PoolError::AlreadyStarted);
        }
        if self.size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let rate_limit = RateLimit::per_worker(self.global_rate_limit, self.size);
        let (sender, receiver) = mpsc::channel::<Job>(self.queue_capacity);
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));

        self.workers = (0..self.size)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let migrator = Arc::clone(&migrator);
                let report = Arc::clone(&self.report);
                tokio::spawn(run_worker(id, queue, migrator, rate_limit, report))
            })
            .collect();

        self.worker_rate_limit = rate_limit;
        self.sender = Some(sender);
        self.state = PoolState::Open;

        tracing::info!(
            workers = self.size,
            queue_capacity = self.queue_capacity,
            worker_rate_limit = ?rate_limit.map(|r| r.to_string()),
            "worker pool open"
        );
        Ok(())
    }

    /// Queue an image without waiting for a worker
    pub fn submit(&self, image: Image) -> Result<MigrationHandle, PoolError> {
        let sender = match (&self.state, &self.sender) {
            (PoolState::Open, Some(sender)) => sender,
            _ => return Err(PoolError::NotOpen),
        };

        let name = image.to_string();
        let (tx, rx) = oneshot::channel();
        let job = Job {
            image,
            name: name.clone(),
            result: tx,
        };

        sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull {
                capacity: self.queue_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => PoolError::NotOpen,
        })?;

        tracing::debug!(image = %name, "submitted");
        Ok(MigrationHandle {
            image: name,
            result: rx,
        })
    }

    /// Stop accepting work, wait for queued and in-flight migrations, and
    /// return the report of everything the pool ran
    pub async fn close(&mut self) -> Result<PoolReport, PoolError> {
        if self.state != PoolState::Open {
            return Err(PoolError::NotOpen);
        }

        self.state = PoolState::Draining;
        tracing::debug!("worker pool draining");
        // Workers exit once the queue is closed and empty
        self.sender = None;

        for worker in self.workers.drain(..) {
            // Panics are caught per job; a join error means the runtime aborted the worker
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }

        self.state = PoolState::Closed;

        let report = std::mem::take(&mut *lock_report(&self.report));

        tracing::info!(
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "worker pool closed"
        );

        Ok(report)
    }
}

/// A worker that panicked while holding the lock must not hide later outcomes
fn lock_report(report: &Mutex<PoolReport>) -> MutexGuard<'_, PoolReport> {
    report.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

async fn run_worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    migrator: Arc<dyn ImageMigrator>,
    rate_limit: Option<RateLimit>,
    report: Arc<Mutex<PoolReport>>,
) {
    loop {
        let job = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else { break };

        let result = AssertUnwindSafe(migrator.migrate(&job.image, rate_limit))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(MigrateError::Panicked(panic_message(payload.as_ref()))));

        if let Err(e) = &result {
            tracing::error!(worker = id, image = %job.name, error = %e, "migration failed");
        }

        lock_report(&report).record(&job.name, &result);

        // The caller may have dropped the handle; the report still has the outcome
        let _ = job.result.send(result);
    }

    tracing::trace!(worker = id, "worker stopped");
}
