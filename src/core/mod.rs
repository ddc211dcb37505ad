//! Admission control, work items and the session scheduler.

pub mod admission;
pub mod correlator;
pub mod error;
pub mod executor;
pub mod log_scope;
pub mod progress;
pub mod scheduler;
pub mod work_item;
mod worker_pool;

pub use admission::{
    AdmissionController, BudgetSettings, Grant, DEFAULT_OVERHEAD_FRACTION,
    DEFAULT_POLL_INTERVAL, DEFAULT_QUANTUM_SIZE,
};
pub use correlator::{Admitted, Correlator, CorrelatorKind, DisparityRequest};
pub use error::{AdmissionError, AppResult, SchedulerError, TaskError};
pub use executor::{BoxedTask, CallBoxed, SharedResources, TaskExecutor, WorkerContext};
pub use log_scope::{LogIsolation, TaskLogScope};
pub use progress::{console_progress, format_progress, Progress, ProgressCallback};
pub use scheduler::{fail_fast, Scheduler, DEFAULT_TIMEOUT};
pub use work_item::{tile_label_from_dir, WorkId, WorkItem, TILE_LOG_FILE};
