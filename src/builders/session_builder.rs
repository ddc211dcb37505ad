//! Build admission controllers and schedulers from configuration.

use tracing::warn;

use crate::config::SchedulerConfig;
use crate::core::{AdmissionController, Scheduler, SchedulerError, SharedResources};

/// Pipeline stage a scheduler is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Any CPU-bound per-tile stage.
    General,
    /// Disparity computation, which may touch the GPU.
    StereoMatching,
}

/// Bounded controller when `gpu_total_memory` is set, unbounded otherwise.
///
/// # Errors
///
/// `SchedulerError::InvalidConfig` for invalid configuration, or
/// `SchedulerError::Admission` if the budget cannot be built.
pub fn build_admission_controller(
    cfg: &SchedulerConfig,
) -> Result<AdmissionController, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;
    match cfg.gpu_total_memory {
        Some(total) => Ok(AdmissionController::bounded_with(total, cfg.budget_settings())?),
        None => Ok(AdmissionController::unbounded()),
    }
}

/// Scheduler for `stage`.
///
/// The stereo matching stage uses its own worker count and carries the GPU
/// admission controller; other stages get an unbounded controller.
///
/// # Errors
///
/// `SchedulerError::InvalidConfig` for invalid configuration, or
/// `SchedulerError::Admission` if the budget cannot be built.
pub fn build_scheduler(cfg: &SchedulerConfig, stage: Stage) -> Result<Scheduler, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let (workers, admission) = match stage {
        Stage::General => (cfg.worker_count(), AdmissionController::unbounded()),
        Stage::StereoMatching => {
            if cfg.gpu_total_memory.is_none() && cfg.max_processes_stereo_matching.is_none() {
                warn!(
                    "neither gpu_total_memory nor max_processes_stereo_matching is set; \
                     GPU correlators may oversubscribe device memory"
                );
            }
            (
                cfg.stereo_matching_worker_count(),
                build_admission_controller(cfg)?,
            )
        }
    };

    Ok(Scheduler::new(workers, cfg.timeout())?
        .with_resources(SharedResources::new().with_admission(admission))
        .with_log_isolation(cfg.log_isolation()))
}
