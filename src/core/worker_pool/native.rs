//! Native `WorkerPool` using dedicated OS threads.
//!
//! - Workers block on channel `recv`; dropping the sender ends them.
//! - Results use one Mutex + Condvar slot per item, no polling.
//! - Shutdown joins each worker with a grace period and detaches stragglers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::core::log_scope::{run_isolated, LogIsolation};
use crate::core::progress::ProgressTracker;
use crate::core::{
    SchedulerError, SharedResources, TaskError, TaskExecutor, WorkId, WorkItem, WorkerContext,
};

use super::{SessionTally, TallyCounters, WorkerTask};

/// How long shutdown waits for each worker before detaching it.
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Result slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Waiting for result.
    Pending,
    /// Result is ready.
    Ready,
}

struct ResultSlot<R> {
    result: Option<Result<R, TaskError>>,
    state: SlotState,
}

/// One slot per submitted item, indexed by submission order.
struct ResultSlots<R> {
    slots: Vec<(Mutex<ResultSlot<R>>, Condvar)>,
}

impl<R> ResultSlots<R> {
    fn with_len(len: usize) -> Self {
        let slots = (0..len)
            .map(|_| {
                (
                    Mutex::new(ResultSlot {
                        result: None,
                        state: SlotState::Pending,
                    }),
                    Condvar::new(),
                )
            })
            .collect();
        Self { slots }
    }

    /// Store a result and wake the waiter.
    fn store(&self, index: usize, result: Result<R, TaskError>) {
        if let Some((slot, condvar)) = self.slots.get(index) {
            let mut slot = slot.lock();
            slot.result = Some(result);
            slot.state = SlotState::Ready;
            condvar.notify_all();
        }
    }

    /// Wait up to `timeout` for slot `index`; `None` when it is still pending.
    fn wait_for_result(&self, index: usize, timeout: Duration) -> Option<Result<R, TaskError>> {
        let (slot, condvar) = self.slots.get(index)?;
        let mut slot = slot.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while slot.state == SlotState::Pending {
                    if condvar.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
            }
            // Deadline past the clock's range: wait without one.
            None => {
                while slot.state == SlotState::Pending {
                    condvar.wait(&mut slot);
                }
            }
        }
        match slot.state {
            SlotState::Ready => slot.result.take(),
            SlotState::Pending => None,
        }
    }
}

/// The item a worker is running. If the worker unwinds before the item's
/// result is stored, dropping this fills the slot with `WorkerLost`.
struct InFlight<'a, R> {
    slots: &'a ResultSlots<R>,
    counters: &'a TallyCounters,
    progress: &'a ProgressTracker,
    index: usize,
    work_id: Option<WorkId>,
}

impl<'a, R> InFlight<'a, R> {
    fn start(
        slots: &'a ResultSlots<R>,
        counters: &'a TallyCounters,
        progress: &'a ProgressTracker,
        index: usize,
        work_id: WorkId,
    ) -> Self {
        counters.running.fetch_add(1, Ordering::Relaxed);
        Self {
            slots,
            counters,
            progress,
            index,
            work_id: Some(work_id),
        }
    }

    fn complete(mut self, result: Result<R, TaskError>) {
        self.work_id = None;
        self.counters.finish(result.is_ok());
        self.progress.record();
        self.slots.store(self.index, result);
    }
}

impl<R> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        if let Some(work_id) = self.work_id.take() {
            warn!(work_id = %work_id, "worker lost while running item");
            self.counters.finish(false);
            self.progress.record();
            self.slots.store(self.index, Err(TaskError::WorkerLost { work_id }));
        }
    }
}

/// Worker pool with dedicated OS threads, living for one session.
pub(crate) struct WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    worker_count: usize,
    /// Task sender (to workers). Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<WorkerTask<P>>>>,
    slots: Arc<ResultSlots<R>>,
    counters: Arc<TallyCounters>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Everything a worker thread owns for the lifetime of the session.
struct WorkerSetup<R, E> {
    executor: Arc<E>,
    resources: SharedResources,
    slots: Arc<ResultSlots<R>>,
    counters: Arc<TallyCounters>,
    progress: Arc<ProgressTracker>,
    shutdown: Arc<AtomicBool>,
    isolation: LogIsolation,
}

impl<P, R> WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Spawn `worker_count` workers for a session of `capacity` items.
    ///
    /// Each worker gets its own clone of `resources` exactly once.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new<E>(
        worker_count: usize,
        capacity: usize,
        executor: Arc<E>,
        resources: &SharedResources,
        progress: Arc<ProgressTracker>,
        isolation: LogIsolation,
        stack_size: Option<usize>,
    ) -> Result<Self, SchedulerError>
    where
        E: TaskExecutor<P, R>,
    {
        let (task_tx, task_rx) = unbounded::<WorkerTask<P>>();
        let slots = Arc::new(ResultSlots::with_len(capacity));
        let counters = Arc::new(TallyCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let setup = WorkerSetup {
                executor: Arc::clone(&executor),
                resources: resources.clone(),
                slots: Arc::clone(&slots),
                counters: Arc::clone(&counters),
                progress: Arc::clone(&progress),
                shutdown: Arc::clone(&shutdown),
                isolation,
            };
            match spawn_worker(worker_id, task_rx.clone(), setup, stack_size) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Already-running workers exit once the sender is dropped.
                    shutdown.store(true, Ordering::Release);
                    drop(task_tx);
                    return Err(SchedulerError::Spawn { worker_id, source });
                }
            }
        }

        info!(worker_count, items = capacity, "worker pool started");

        Ok(Self {
            worker_count,
            task_tx: Mutex::new(Some(task_tx)),
            slots,
            counters,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Queue item `index` for the workers. Returns `false` if no worker can take it.
    pub(crate) fn submit(&self, index: usize, item: WorkItem<P>) -> bool {
        let task_tx = self.task_tx.lock();
        let Some(task_tx) = task_tx.as_ref() else {
            return false;
        };
        if task_tx.send(WorkerTask { index, item }).is_ok() {
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Record a result for an item that never reached a worker.
    pub(crate) fn store(&self, index: usize, result: Result<R, TaskError>) {
        self.slots.store(index, result);
    }

    /// Wait up to `timeout` for item `index`.
    pub(crate) fn retrieve(
        &self,
        index: usize,
        work_id: &WorkId,
        timeout: Duration,
    ) -> Result<R, TaskError> {
        self.slots
            .wait_for_result(index, timeout)
            .unwrap_or_else(|| {
                warn!(work_id = %work_id, ?timeout, "task not finished within timeout");
                Err(TaskError::Timeout {
                    work_id: work_id.clone(),
                    timeout,
                })
            })
    }

    /// Item counts so far.
    pub(crate) fn tally(&self) -> SessionTally {
        self.counters.tally(self.worker_count)
    }

    /// Stop accepting work and join the workers.
    ///
    /// Workers still busy after the grace period (typically running an item
    /// whose wait timed out) are detached and finish on their own.
    pub(crate) fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.task_tx.lock() = None;

        let mut workers = self.workers.lock();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(JOIN_GRACE) {
                Ok(true) => {
                    debug!(worker_id = idx, "worker joined");
                    let _ = joiner.join();
                }
                Ok(false) => {
                    warn!(worker_id = idx, "worker panicked");
                    let _ = joiner.join();
                }
                Err(_) => {
                    warn!(worker_id = idx, "worker still busy after grace period, detaching");
                }
            }
        }
        debug!(worker_count = self.worker_count, "worker pool shut down");
    }
}

impl<P, R> Drop for WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn drop(&mut self) {
        // Signal only; joining here could hang on an abandoned item.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.task_tx.lock() = None;
            debug!("worker pool dropped without explicit shutdown, workers detached");
        }
    }
}

fn spawn_worker<P, R, E>(
    worker_id: usize,
    task_rx: Receiver<WorkerTask<P>>,
    setup: WorkerSetup<R, E>,
    stack_size: Option<usize>,
) -> std::io::Result<JoinHandle<()>>
where
    P: Send + 'static,
    R: Send + 'static,
    E: TaskExecutor<P, R>,
{
    let mut builder = thread::Builder::new().name(format!("tile-worker-{worker_id}"));
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    builder.spawn(move || {
        let WorkerSetup {
            executor,
            resources,
            slots,
            counters,
            progress,
            shutdown,
            isolation,
        } = setup;
        let ctx = WorkerContext::new(worker_id, resources);
        debug!(worker_id, "worker started");

        // recv() fails once the sender is dropped and the queue is drained.
        while let Ok(WorkerTask { index, item }) = task_rx.recv() {
            if shutdown.load(Ordering::Acquire) {
                debug!(worker_id, "session over, dropping queued item");
                break;
            }
            debug!(worker_id, work_id = %item.id, "worker executing item");
            let in_flight = InFlight::start(&slots, &counters, &progress, index, item.id.clone());
            let result = run_isolated(executor.as_ref(), item, &ctx, isolation);
            in_flight.complete(result);
        }

        debug!(worker_id, "worker exiting");
    })
}
