use std::time::Duration;

use backstop::{ApiError, BreakerScope, CircuitBreakerConfig, CircuitState};
use httpmock::{Method::GET, MockServer};
use serde_json::{Value, json};

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503).body("upstream down");
    });

    let client = crate::common::client_builder(&server)
        .disable_cache()
        .build()
        .unwrap();

    let err = client.get::<Value>("flaky").await.unwrap_err();
    // default test policy is 3 retries: 4 calls total
    mock.assert_calls(4);
    assert!(matches!(err, ApiError::ServerError { status: 503, .. }));
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn terminal_statuses_are_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404);
    });

    let client = crate::common::client_builder(&server)
        .disable_cache()
        .build()
        .unwrap();

    let err = client.get::<Value>("missing").await.unwrap_err();
    mock.assert();
    assert!(matches!(err, ApiError::NotFound { .. }));
}

#[tokio::test]
async fn repeated_failures_trip_the_breaker() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503).body("upstream down");
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        })
        .disable_cache()
        .build()
        .unwrap();

    for _ in 0..3 {
        let err = client.get::<Value>("flaky").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
    mock.assert_calls(3);
    assert_eq!(client.breaker_state().state, CircuitState::Open);
    assert_eq!(client.breaker_state().failure_count, 3);

    // the open breaker rejects without a network call
    let err = client.get::<Value>("flaky").await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen));
    mock.assert_calls(3);
}

#[tokio::test]
async fn breaker_recovers_through_half_open_probe() {
    let server = MockServer::start();
    let mut broken = server.mock(|when, then| {
        when.method(GET).path("/wobbly");
        then.status(500);
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(100),
        })
        .disable_cache()
        .build()
        .unwrap();

    // trip it with a 500
    let _ = client.get::<Value>("wobbly").await.unwrap_err();
    broken.assert();
    assert_eq!(client.breaker_state().state, CircuitState::Open);

    // upstream heals
    broken.delete();
    let healed = server.mock(|when, then| {
        when.method(GET).path("/wobbly");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"ok": true}));
    });

    // cooldown elapses; the next call is the half-open probe and it succeeds
    tokio::time::sleep(Duration::from_millis(150)).await;
    let resp = client.get::<Value>("wobbly").await.unwrap();
    healed.assert();
    assert_eq!(resp.data["ok"], true);
    assert_eq!(client.breaker_state().state, CircuitState::Closed);
    assert_eq!(client.breaker_state().failure_count, 0);
}

#[tokio::test]
async fn per_endpoint_scope_isolates_failing_routes() {
    let server = MockServer::start();
    let bad = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503);
    });
    let good = server.mock(|when, then| {
        when.method(GET).path("/solid");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"ok": true}));
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })
        .breaker_scope(BreakerScope::PerEndpoint)
        .disable_cache()
        .build()
        .unwrap();

    let _ = client.get::<Value>("flaky").await.unwrap_err();
    bad.assert();
    assert_eq!(
        client.breaker_state_for("flaky").state,
        CircuitState::Open
    );

    // the healthy route keeps its own, closed breaker
    let resp = client.get::<Value>("solid").await.unwrap();
    good.assert();
    assert_eq!(resp.data["ok"], true);
    assert_eq!(
        client.breaker_state_for("solid").state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn per_endpoint_scope_shares_one_breaker_per_route() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(503);
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })
        .breaker_scope(BreakerScope::PerEndpoint)
        .disable_cache()
        .build()
        .unwrap();

    let _ = client.get::<Value>("items").await.unwrap_err();
    mock.assert();

    // spelling variants resolve to the same route, so they find the same
    // open breaker instead of a fresh closed one
    let err = client.get::<Value>("/items").await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen));
    let err = client.get::<Value>("./items").await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen));
    mock.assert_calls(1);

    assert_eq!(client.breaker_state_for("items").state, CircuitState::Open);
    assert_eq!(
        client.breaker_state_for("items"),
        client.breaker_state_for("./items?page=2")
    );
}

#[tokio::test]
async fn per_call_retry_override_wins() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503);
    });

    // client default would retry three times; the call overrides to zero
    let client = crate::common::client_builder(&server)
        .disable_cache()
        .build()
        .unwrap();

    let err = client
        .request(backstop::Method::GET, "flaky")
        .retry_policy(Some(crate::common::no_retry()))
        .fetch::<Value>()
        .await
        .unwrap_err();
    mock.assert();
    assert_eq!(err.status(), Some(503));
}
