//! Session driver: run a list of work items across a fixed worker pool.
//!
//! With one worker, items run in-process, on the calling thread, in
//! submission order. With more, a pool of worker threads is created for the
//! session, every item is dispatched in submission order, and the caller waits
//! for each result in turn, bounded by the scheduler's timeout.
//!
//! A failing item never cancels its siblings; it only shows up as its own
//! `Err` in the returned vector. Use [`fail_fast`] to treat any failure as
//! fatal for the whole session.
//!
//! ```rust
//! use std::time::Duration;
//! use tile_scheduler::core::{Scheduler, WorkItem, WorkerContext, AppResult};
//!
//! let scheduler = Scheduler::new(2, Duration::from_secs(60)).unwrap();
//! let items = (0..4u32).map(|i| WorkItem::new(format!("tile-{i}"), i)).collect();
//! let results = scheduler
//!     .schedule(|x: u32, _ctx: &WorkerContext| -> AppResult<u32> { Ok(x + 1) }, items)
//!     .unwrap();
//! assert_eq!(results.len(), 4);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};
use uuid::Uuid;

use crate::core::log_scope::{run_isolated, LogIsolation};
use crate::core::progress::{ProgressCallback, ProgressTracker};
use crate::core::worker_pool::WorkerPool;
use crate::core::{
    AdmissionController, SchedulerError, SharedResources, TaskError, TaskExecutor, WorkId,
    WorkItem, WorkerContext,
};
use crate::util::format_elapsed;

/// Default per-item timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs scheduling sessions with a fixed worker count and per-item timeout.
#[derive(Clone)]
pub struct Scheduler {
    worker_count: usize,
    timeout: Duration,
    resources: SharedResources,
    progress: Option<ProgressCallback>,
    isolation: LogIsolation,
    thread_stack_size: Option<usize>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_count", &self.worker_count)
            .field("timeout", &self.timeout)
            .field("resources", &self.resources)
            .field("isolation", &self.isolation)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler with `worker_count` workers and a per-item `timeout`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if `worker_count` is zero or `timeout`
    /// is zero.
    pub fn new(worker_count: usize, timeout: Duration) -> Result<Self, SchedulerError> {
        if worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        if timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "timeout must be greater than 0".into(),
            ));
        }
        Ok(Self {
            worker_count,
            timeout,
            resources: SharedResources::new(),
            progress: None,
            isolation: LogIsolation::default(),
            thread_stack_size: None,
        })
    }

    /// Deterministic single-worker scheduler with the default timeout.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            worker_count: 1,
            timeout: DEFAULT_TIMEOUT,
            resources: SharedResources::new(),
            progress: None,
            isolation: LogIsolation::default(),
            thread_stack_size: None,
        }
    }

    /// Shared handles given to every worker at start-up.
    #[must_use]
    pub fn with_resources(mut self, resources: SharedResources) -> Self {
        self.resources = resources;
        self
    }

    /// Shortcut for replacing only the admission controller.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.resources = self.resources.with_admission(admission);
        self
    }

    /// Callback invoked once per finished item.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// How per-item logs are mirrored to stderr.
    #[must_use]
    pub const fn with_log_isolation(mut self, isolation: LogIsolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Stack size of worker threads.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    /// Number of workers.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Per-item timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Shared handles of this scheduler.
    #[must_use]
    pub const fn resources(&self) -> &SharedResources {
        &self.resources
    }

    /// Run `executor` over every item and return one result per item, in
    /// submission order.
    ///
    /// The timeout bounds each wait in the parallel path. A timed-out item
    /// keeps running on its worker; its result is discarded. The sequential
    /// path runs every item to completion.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Spawn` if the worker pool cannot be created. Item
    /// failures are reported in the returned vector instead.
    pub fn schedule<P, R, E>(
        &self,
        executor: E,
        items: Vec<WorkItem<P>>,
    ) -> Result<Vec<Result<R, TaskError>>, SchedulerError>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: TaskExecutor<P, R>,
    {
        let session = Uuid::new_v4();
        let total = items.len();
        let started = Instant::now();
        info!(
            session = %session,
            items = total,
            workers = self.worker_count,
            timeout = ?self.timeout,
            "session started"
        );

        let progress = Arc::new(ProgressTracker::new(total, self.progress.clone()));
        let results = if self.worker_count == 1 || total == 0 {
            self.run_sequential(&executor, items, &progress)
        } else {
            self.run_parallel(executor, items, progress)?
        };

        let failed = results.iter().filter(|r| r.is_err()).count();
        let timed_out = results
            .iter()
            .filter(|r| r.as_ref().is_err_and(TaskError::is_timeout))
            .count();
        info!(
            session = %session,
            completed = total - failed,
            failed,
            timed_out,
            elapsed = %format_elapsed(started.elapsed()),
            "session finished"
        );
        Ok(results)
    }

    fn run_sequential<P, R, E>(
        &self,
        executor: &E,
        items: Vec<WorkItem<P>>,
        progress: &ProgressTracker,
    ) -> Vec<Result<R, TaskError>>
    where
        E: TaskExecutor<P, R>,
    {
        let ctx = WorkerContext::new(0, self.resources.clone());
        items
            .into_iter()
            .map(|item| {
                let result = run_isolated(executor, item, &ctx, self.isolation);
                progress.record();
                result
            })
            .collect()
    }

    fn run_parallel<P, R, E>(
        &self,
        executor: E,
        items: Vec<WorkItem<P>>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<Result<R, TaskError>>, SchedulerError>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: TaskExecutor<P, R>,
    {
        let ids: Vec<WorkId> = items.iter().map(|item| item.id.clone()).collect();
        let pool = WorkerPool::new(
            self.worker_count.min(items.len()),
            items.len(),
            Arc::new(executor),
            &self.resources,
            progress,
            self.isolation,
            self.thread_stack_size,
        )?;

        for (index, item) in items.into_iter().enumerate() {
            if !pool.submit(index, item) {
                pool.store(
                    index,
                    Err(TaskError::WorkerLost {
                        work_id: ids[index].clone(),
                    }),
                );
            }
        }

        let results = ids
            .iter()
            .enumerate()
            .map(|(index, id)| pool.retrieve(index, id, self.timeout))
            .collect();

        let tally = pool.tally();
        info!(
            workers = tally.workers,
            dispatched = tally.dispatched,
            succeeded = tally.succeeded,
            failed = tally.failed,
            still_running = tally.running,
            "collection finished"
        );
        pool.shutdown();
        Ok(results)
    }
}

/// Unwrap a session's results, stopping at the first failure in submission
/// order. The failing item's identifier and log location are logged.
///
/// # Errors
///
/// The first [`TaskError`] found.
pub fn fail_fast<R>(results: Vec<Result<R, TaskError>>) -> Result<Vec<R>, TaskError> {
    results
        .into_iter()
        .map(|result| {
            result.map_err(|err| {
                error!(
                    work_id = %err.work_id(),
                    log = ?err.log_path(),
                    error = %err,
                    "task failed, aborting session"
                );
                err
            })
        })
        .collect()
}
