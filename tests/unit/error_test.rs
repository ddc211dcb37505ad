//! Tests for error types

use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use tile_scheduler::core::{AdmissionError, SchedulerError, TaskError, WorkId};

#[test]
fn test_unsatisfiable_error() {
    let err = AdmissionError::Unsatisfiable {
        requested: 21,
        capacity: 20,
        quantum_size: 100.0,
    };
    assert_eq!(
        format!("{err}"),
        "21 quanta requested, only 20 total available (1 quantum = 100)"
    );
}

#[test]
fn test_invalid_amount_error() {
    let err = AdmissionError::InvalidAmount(-3.5);
    assert_eq!(format!("{err}"), "invalid resource amount: -3.5");
}

#[test]
fn test_timeout_error() {
    let err = TaskError::Timeout {
        work_id: WorkId::from("row_0/col_512"),
        timeout: Duration::from_secs(600),
    };
    assert_eq!(format!("{err}"), "task row_0/col_512 timed out after 600s");
    assert!(err.is_timeout());
    assert_eq!(err.log_path(), None);
}

#[test]
fn test_execution_error_keeps_chain_and_log() {
    let source = anyhow!("no matches").context("sift failed");
    let err = TaskError::Execution {
        work_id: WorkId::from("tile-3"),
        log_path: Some(PathBuf::from("/out/tiles/row_0/col_3/stdout.log")),
        source,
    };
    assert_eq!(format!("{err}"), "task tile-3 failed: sift failed: no matches");
    assert!(!err.is_timeout());
    assert_eq!(err.work_id().as_str(), "tile-3");
    assert_eq!(
        err.log_path(),
        Some(PathBuf::from("/out/tiles/row_0/col_3/stdout.log").as_path())
    );
}

#[test]
fn test_worker_lost_error() {
    let err = TaskError::WorkerLost {
        work_id: WorkId::from("tile-9"),
    };
    assert_eq!(format!("{err}"), "worker lost before task tile-9 completed");
}

#[test]
fn test_admission_converts_into_scheduler_error() {
    let err: SchedulerError = AdmissionError::InvalidAmount(f64::NAN).into();
    assert!(matches!(err, SchedulerError::Admission(_)));
    assert_eq!(format!("{err}"), "invalid resource amount: NaN");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("timeout_secs must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: timeout_secs must be greater than 0"
    );
}
