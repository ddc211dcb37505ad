//! Concurrency tests for the admission controller
//!
//! These tests validate:
//! - The capacity invariant under many concurrent requesters
//! - Blocking and wake-up when quanta are released
//! - Fast rejection while the budget is busy
//! - The async request path

use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tile_scheduler::core::{AdmissionController, AdmissionError, BudgetSettings};

// ============================================================================
// CAPACITY INVARIANT
// ============================================================================

#[test]
fn test_outstanding_grants_never_exceed_capacity() {
    println!("\n=== test_outstanding_grants_never_exceed_capacity ===");

    let gpu = AdmissionController::bounded(1000.0, 100.0).unwrap();
    let total = gpu.total_quanta().unwrap();
    let held = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gpu = gpu.clone();
            let held = Arc::clone(&held);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..25 {
                    let amount: f64 = rng.random_range(0.0..900.0);
                    let grant = gpu.request(amount).unwrap();
                    let now = held.fetch_add(grant.quanta(), Ordering::SeqCst) + grant.quanta();
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(now <= total, "{now} quanta outstanding, capacity {total}");
                    thread::sleep(Duration::from_micros(rng.random_range(0..500)));
                    held.fetch_sub(grant.quanta(), Ordering::SeqCst);
                    drop(grant);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    println!("peak outstanding quanta: {}", peak.load(Ordering::SeqCst));
    assert!(peak.load(Ordering::SeqCst) <= total);
    assert_eq!(gpu.remaining(), Some(total));

    println!("=== test_outstanding_grants_never_exceed_capacity PASSED ===\n");
}

// ============================================================================
// BLOCKING AND WAKE-UP
// ============================================================================

#[test]
fn test_second_request_waits_for_release() {
    println!("\n=== test_second_request_waits_for_release ===");

    // C = 5, two requests of 4 quanta each (380 * 1.05 = 399 -> 4).
    let gpu = AdmissionController::bounded(500.0, 100.0).unwrap();
    let first = gpu.request(380.0).unwrap();
    assert_eq!(first.quanta(), 4);

    let granted = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(2));
    let waiter = {
        let gpu = gpu.clone();
        let granted = Arc::clone(&granted);
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            ready.wait();
            let grant = gpu.request(380.0).unwrap();
            granted.store(true, Ordering::SeqCst);
            let at = Instant::now();
            drop(grant);
            at
        })
    };

    ready.wait();
    thread::sleep(Duration::from_millis(250));
    assert!(
        !granted.load(Ordering::SeqCst),
        "second request must block while the first holds its grant"
    );

    let released_at = Instant::now();
    drop(first);
    let granted_at = waiter.join().unwrap();

    let delay = granted_at.duration_since(released_at);
    println!("granted {delay:?} after release");
    assert!(delay < Duration::from_millis(500));
    assert_eq!(gpu.remaining(), Some(5));

    println!("=== test_second_request_waits_for_release PASSED ===\n");
}

#[test]
fn test_poll_interval_bounds_each_wait() {
    let settings = BudgetSettings::new()
        .with_quantum_size(100.0)
        .with_poll_interval(Duration::from_millis(10));
    let gpu = AdmissionController::bounded_with(300.0, settings).unwrap();
    let held = gpu.request(200.0).unwrap();

    let waiter = {
        let gpu = gpu.clone();
        thread::spawn(move || gpu.request(100.0).map(|g| g.quanta()))
    };
    thread::sleep(Duration::from_millis(50));
    drop(held);

    assert_eq!(waiter.join().unwrap().unwrap(), 2);
}

// ============================================================================
// FAST REJECTION
// ============================================================================

#[test]
fn test_unsatisfiable_request_does_not_wait_even_when_busy() {
    let gpu = AdmissionController::bounded(500.0, 100.0).unwrap();
    let _held = gpu.request(400.0).unwrap();
    let remaining = gpu.remaining();

    let start = Instant::now();
    let err = gpu.request(10_000.0).unwrap_err();

    assert!(matches!(err, AdmissionError::Unsatisfiable { capacity: 5, .. }));
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(gpu.remaining(), remaining);
}

#[test]
fn test_error_message_names_quanta() {
    let gpu = AdmissionController::bounded(500.0, 100.0).unwrap();
    let err = gpu.request(10_000.0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "105 quanta requested, only 5 total available (1 quantum = 100)"
    );
}

// ============================================================================
// UNBOUNDED
// ============================================================================

#[test]
fn test_unbounded_never_blocks() {
    let gpu = AdmissionController::unbounded();
    let grants: Vec<_> = (0..100).map(|_| gpu.request(1.0e9).unwrap()).collect();
    assert!(grants.iter().all(|g| g.quanta() == 0));

    for amount in [f64::INFINITY, f64::MAX, -1.0, f64::NAN] {
        let start = Instant::now();
        let grant = gpu.request(amount).unwrap();
        assert_eq!(grant.quanta(), 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

// ============================================================================
// ASYNC
// ============================================================================

#[tokio::test]
async fn test_request_async_waits_without_blocking_runtime() {
    let settings = BudgetSettings::new().with_poll_interval(Duration::from_millis(10));
    let gpu = AdmissionController::bounded_with(200.0, settings).unwrap();
    let held = gpu.request_async(150.0).await.unwrap();
    assert_eq!(gpu.remaining(), Some(0));

    let waiter = {
        let gpu = gpu.clone();
        tokio::spawn(async move { gpu.request_async(150.0).await.map(|g| g.quanta()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let quanta = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter granted")
        .unwrap()
        .unwrap();
    assert_eq!(quanta, 2);
    assert_eq!(gpu.remaining(), Some(2));
}

#[tokio::test]
async fn test_request_async_fast_rejects() {
    let gpu = AdmissionController::bounded(200.0, 100.0).unwrap();
    assert!(matches!(
        gpu.request_async(500.0).await,
        Err(AdmissionError::Unsatisfiable { .. })
    ));
}
