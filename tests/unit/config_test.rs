//! Tests for configuration validation

use std::time::Duration;

use tile_scheduler::config::SchedulerConfig;

#[test]
fn test_scheduler_config_from_json() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "max_processes": 16,
            "max_processes_stereo_matching": 4,
            "gpu_total_memory": 24000,
            "timeout_secs": 120
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.worker_count(), 16);
    assert_eq!(cfg.stereo_matching_worker_count(), 4);
    assert_eq!(cfg.gpu_total_memory, Some(24000.0));
    assert_eq!(cfg.gpu_quantum_mb, 100.0);
    assert_eq!(cfg.timeout(), Duration::from_secs(120));
}

#[test]
fn test_stereo_workers_fall_back_to_general() {
    let cfg = SchedulerConfig::from_json_str(r#"{"max_processes": 3}"#).unwrap();
    assert_eq!(cfg.stereo_matching_worker_count(), 3);
}

#[test]
fn test_scheduler_config_invalid_workers() {
    let cfg = SchedulerConfig {
        max_processes: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_budget() {
    let negative = SchedulerConfig {
        gpu_total_memory: Some(-1.0),
        ..SchedulerConfig::default()
    };
    assert!(negative.validate().is_err());

    let zero_quantum = SchedulerConfig {
        gpu_quantum_mb: 0.0,
        ..SchedulerConfig::default()
    };
    assert!(zero_quantum.validate().is_err());
}

#[test]
fn test_scheduler_config_rejects_bad_json() {
    let err = SchedulerConfig::from_json_str("{\"timeout_secs\": \"soon\"}").unwrap_err();
    assert!(err.starts_with("parse error"));
    let err = SchedulerConfig::from_json_str("{\"timeout_secs\": 0}").unwrap_err();
    assert!(err.contains("timeout_secs"));
}

#[test]
fn test_budget_settings_follow_config() {
    let cfg = SchedulerConfig {
        gpu_quantum_mb: 50.0,
        gpu_overhead_fraction: 0.1,
        gpu_poll_interval_ms: 20,
        ..SchedulerConfig::default()
    };
    let settings = cfg.budget_settings();
    assert_eq!(settings.quantum_size, 50.0);
    assert_eq!(settings.overhead_fraction, 0.1);
    assert_eq!(settings.poll_interval, Duration::from_millis(20));
}

#[test]
fn test_debug_flag_overrides() {
    let mut cfg = SchedulerConfig::default();
    cfg.apply_overrides([("TILE_SCHEDULER_DEBUG", "yes")]).unwrap();
    assert!(cfg.log_isolation().debug);
    assert!(cfg
        .apply_overrides([("TILE_SCHEDULER_DEBUG", "maybe")])
        .is_err());
}
