//! Pipeline configuration consumed by the scheduler.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, ENV_PREFIX};
