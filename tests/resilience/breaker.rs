use std::time::Duration;

use backstop::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
    CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: threshold,
        reset_timeout: Duration::from_millis(reset_ms),
    })
}

#[test]
fn stays_closed_below_the_threshold() {
    let b = breaker(5, 60_000);
    for _ in 0..4 {
        b.record_failure();
    }
    assert!(!b.is_open());
    let snap = b.snapshot();
    assert_eq!(snap.state, CircuitState::Closed);
    assert_eq!(snap.failure_count, 4);
}

#[test]
fn opens_at_the_threshold() {
    let b = breaker(5, 60_000);
    for _ in 0..5 {
        b.record_failure();
    }
    assert!(b.is_open());
    assert_eq!(b.snapshot().state, CircuitState::Open);
}

#[test]
fn open_keeps_rejecting_before_the_cooldown() {
    let b = breaker(1, 60_000);
    b.record_failure();
    assert!(b.is_open());
    // repeated checks do not advance the state early
    assert!(b.is_open());
    assert_eq!(b.snapshot().state, CircuitState::Open);
}

#[test]
fn success_resets_the_count_whatever_the_state() {
    let b = breaker(5, 60_000);
    for _ in 0..3 {
        b.record_failure();
    }
    b.record_success();
    assert_eq!(b.snapshot().failure_count, 0);

    // the earlier three no longer count toward the threshold
    for _ in 0..4 {
        b.record_failure();
    }
    assert!(!b.is_open());
}

#[test]
fn cooldown_moves_open_to_half_open_on_check() {
    let b = breaker(2, 100);
    b.record_failure();
    b.record_failure();
    assert!(b.is_open());

    std::thread::sleep(Duration::from_millis(150));
    // the check itself performs the transition and grants the probe
    assert!(!b.is_open());
    assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
}

#[test]
fn failed_probe_reopens_and_keeps_counting() {
    let b = breaker(2, 50);
    b.record_failure();
    b.record_failure();
    std::thread::sleep(Duration::from_millis(80));
    assert!(!b.is_open());

    b.record_failure();
    let snap = b.snapshot();
    assert_eq!(snap.state, CircuitState::Open);
    // cumulative across the whole outage, not per window
    assert_eq!(snap.failure_count, 3);
    assert!(b.is_open());
}

#[test]
fn successful_probe_closes_the_circuit() {
    let b = breaker(2, 50);
    b.record_failure();
    b.record_failure();
    std::thread::sleep(Duration::from_millis(80));
    assert!(!b.is_open());

    b.record_success();
    let snap = b.snapshot();
    assert_eq!(snap.state, CircuitState::Closed);
    assert_eq!(snap.failure_count, 0);
    assert!(!b.is_open());
}

#[test]
fn half_open_allows_checks_until_an_outcome_lands() {
    let b = breaker(1, 50);
    b.record_failure();
    std::thread::sleep(Duration::from_millis(80));
    assert!(!b.is_open());
    // still half-open until a success or failure is recorded
    assert!(!b.is_open());
    assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
}
