//! Error types for admission control and scheduling.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::WorkId;

/// Errors produced by the admission controller.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A single request can never fit in the declared budget.
    #[error("{requested} quanta requested, only {capacity} total available (1 quantum = {quantum_size})")]
    Unsatisfiable {
        /// Quanta required by the request, overhead included.
        requested: u64,
        /// Total quanta of the budget.
        capacity: u32,
        /// Size of one quantum in resource units.
        quantum_size: f64,
    },
    /// The requested amount is negative or not a finite number.
    #[error("invalid resource amount: {0}")]
    InvalidAmount(f64),
}

/// Per-item failures reported by a scheduling session.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The item's result was not available within the configured timeout.
    ///
    /// The underlying computation may still be running.
    #[error("task {work_id} timed out after {timeout:?}")]
    Timeout {
        /// Identifier of the item.
        work_id: WorkId,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The item's target function returned an error or panicked.
    #[error("task {work_id} failed: {source:#}")]
    Execution {
        /// Identifier of the item.
        work_id: WorkId,
        /// Dedicated log the failure was recorded to, if any.
        log_path: Option<PathBuf>,
        /// Error raised by the target function.
        source: anyhow::Error,
    },
    /// The item's dedicated log destination could not be opened.
    #[error("task {work_id}: cannot open log {}: {source}", path.display())]
    LogSetup {
        /// Identifier of the item.
        work_id: WorkId,
        /// Log destination that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The worker holding the item went away without producing a result.
    #[error("worker lost before task {work_id} completed")]
    WorkerLost {
        /// Identifier of the item.
        work_id: WorkId,
    },
}

impl TaskError {
    /// Identifier of the failed item.
    #[must_use]
    pub const fn work_id(&self) -> &WorkId {
        match self {
            Self::Timeout { work_id, .. }
            | Self::Execution { work_id, .. }
            | Self::LogSetup { work_id, .. }
            | Self::WorkerLost { work_id } => work_id,
        }
    }

    /// Log destination associated with the failure, when one exists.
    #[must_use]
    pub fn log_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Execution { log_path, .. } => log_path.as_deref(),
            Self::LogSetup { path, .. } => Some(path),
            Self::Timeout { .. } | Self::WorkerLost { .. } => None,
        }
    }

    /// True for [`TaskError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors raised while setting up a scheduler or session.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        /// Index of the worker.
        worker_id: usize,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The admission controller could not be built.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

/// Application-facing result using anyhow for target functions.
pub type AppResult<T> = Result<T, anyhow::Error>;
