use std::time::Duration;

use backstop::Backoff;

fn assert_close(d: Duration, expect_ms: u64) {
    let got = d.as_millis() as i128;
    assert!(
        (got - i128::from(expect_ms)).abs() <= 1,
        "expected ~{expect_ms}ms, got {got}ms"
    );
}

#[test]
fn exponential_delays_double_up_to_the_cap() {
    let backoff = Backoff::Exponential {
        base: Duration::from_millis(1000),
        factor: 2.0,
        max: Duration::from_secs(10),
        jitter: false,
    };
    assert_close(backoff.delay_for(0), 1000);
    assert_close(backoff.delay_for(1), 2000);
    assert_close(backoff.delay_for(2), 4000);
    assert_close(backoff.delay_for(3), 8000);
    // capped from here on
    assert_close(backoff.delay_for(4), 10_000);
    assert_close(backoff.delay_for(20), 10_000);
}

#[test]
fn unjittered_sequence_never_decreases() {
    let backoff = Backoff::Exponential {
        base: Duration::from_millis(250),
        factor: 2.0,
        max: Duration::from_secs(5),
        jitter: false,
    };
    let mut prev = Duration::ZERO;
    for attempt in 0..12 {
        let delay = backoff.delay_for(attempt);
        assert!(delay >= prev, "delay shrank at attempt {attempt}");
        prev = delay;
    }
}

#[test]
fn jitter_adds_at_most_thirty_percent() {
    let base = Duration::from_millis(1000);
    let max = Duration::from_secs(10);
    let backoff = Backoff::Exponential {
        base,
        factor: 2.0,
        max,
        jitter: true,
    };
    for attempt in 0..6 {
        let raw = (base.as_secs_f64() * 2.0_f64.powf(f64::from(attempt))).min(max.as_secs_f64());
        for _ in 0..200 {
            let delay = backoff.delay_for(attempt).as_secs_f64();
            assert!(delay >= raw - 1e-6, "jitter went below the raw delay");
            assert!(
                delay <= raw * 1.3 + 1e-6,
                "jitter exceeded 30%: attempt {attempt}, delay {delay}"
            );
        }
    }
}

#[test]
fn jittered_delay_never_exceeds_cap_plus_jitter() {
    let backoff = Backoff::Exponential {
        base: Duration::from_secs(1),
        factor: 2.0,
        max: Duration::from_secs(10),
        jitter: true,
    };
    for _ in 0..500 {
        let delay = backoff.delay_for(30);
        assert!(delay <= Duration::from_secs_f64(13.0) + Duration::from_millis(1));
    }
}

#[test]
fn fixed_backoff_is_constant() {
    let backoff = Backoff::Fixed(Duration::from_millis(75));
    for attempt in [0, 1, 5, 100] {
        assert_eq!(backoff.delay_for(attempt), Duration::from_millis(75));
    }
}
