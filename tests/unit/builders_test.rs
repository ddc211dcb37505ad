//! Tests for builder modules

use std::time::Duration;

use tile_scheduler::builders::{build_admission_controller, build_scheduler, Stage};
use tile_scheduler::config::SchedulerConfig;
use tile_scheduler::core::{AppResult, WorkItem, WorkerContext};

#[test]
fn test_admission_controller_bounded_when_budget_set() {
    let cfg = SchedulerConfig {
        gpu_total_memory: Some(2000.0),
        ..SchedulerConfig::default()
    };
    let gpu = build_admission_controller(&cfg).unwrap();
    assert!(gpu.is_bounded());
    assert_eq!(gpu.total_quanta(), Some(20));
}

#[test]
fn test_admission_controller_unbounded_by_default() {
    let gpu = build_admission_controller(&SchedulerConfig::default()).unwrap();
    assert!(!gpu.is_bounded());
    assert_eq!(gpu.remaining(), None);
}

#[test]
fn test_stereo_matching_scheduler_carries_budget() {
    let cfg = SchedulerConfig {
        max_processes: Some(8),
        max_processes_stereo_matching: Some(2),
        gpu_total_memory: Some(1000.0),
        timeout_secs: 30,
        ..SchedulerConfig::default()
    };

    let stereo = build_scheduler(&cfg, Stage::StereoMatching).unwrap();
    assert_eq!(stereo.worker_count(), 2);
    assert_eq!(stereo.timeout(), Duration::from_secs(30));
    assert_eq!(stereo.resources().admission().total_quanta(), Some(10));

    let general = build_scheduler(&cfg, Stage::General).unwrap();
    assert_eq!(general.worker_count(), 8);
    assert!(!general.resources().admission().is_bounded());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        timeout_secs: 0,
        ..SchedulerConfig::default()
    };
    assert!(build_scheduler(&cfg, Stage::General).is_err());
}

#[test]
fn test_largest_configured_timeout_still_schedules() {
    let mut cfg = SchedulerConfig {
        max_processes: Some(2),
        ..SchedulerConfig::default()
    };
    cfg.apply_overrides([("TILE_SCHEDULER_TIMEOUT_SECS", "18446744073709551615")])
        .unwrap();
    let scheduler = build_scheduler(&cfg, Stage::General).unwrap();
    assert_eq!(scheduler.timeout(), Duration::from_secs(u64::MAX));

    let items = vec![WorkItem::new("a", 1u32), WorkItem::new("b", 2u32)];
    let echo = |x: u32, _: &WorkerContext| -> AppResult<u32> { Ok(x) };
    let results = scheduler.schedule(echo, items).unwrap();
    assert!(results.iter().all(Result::is_ok));
}
