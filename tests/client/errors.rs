use std::time::Duration;

use backstop::{ApiClient, ApiError, Method, RetryConfig, is_transient_message};
use httpmock::{Method::DELETE, Method::GET, MockServer};
use serde_json::Value;

#[test]
fn transient_markers_classify_messages_case_insensitively() {
    for message in [
        "Network request failed",
        "TIMEOUT waiting for headers",
        "Connection reset by peer",
        "fetch aborted",
        "connect ECONNREFUSED 127.0.0.1:443",
        "getaddrinfo EnotFound api.internal",
    ] {
        assert!(
            is_transient_message(message),
            "{message:?} should read as transient"
        );
    }

    assert!(!is_transient_message("invalid payload shape"));
    assert!(!is_transient_message(""));
}

#[test]
fn message_classified_errors_feed_the_retry_policy() {
    let policy = RetryConfig::default();

    let transient = ApiError::network_from_message("connection dropped mid-read");
    assert!(matches!(
        transient,
        ApiError::Network {
            retryable: true,
            ..
        }
    ));
    assert!(transient.is_network());
    assert!(policy.should_retry(&transient));

    let terminal = ApiError::network_from_message("certificate rejected by policy");
    assert!(matches!(
        terminal,
        ApiError::Network {
            retryable: false,
            ..
        }
    ));
    assert!(!policy.should_retry(&terminal));
}

#[tokio::test]
async fn not_found_maps_to_its_own_variant() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/users/42");
        then.status(404);
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .disable_cache()
        .build()
        .unwrap();

    let err = client.get::<Value>("users/42").await.unwrap_err();
    mock.assert();
    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn rate_limits_and_server_errors_are_distinguished() {
    let server = MockServer::start();
    let limited = server.mock(|when, then| {
        when.method(GET).path("/limited");
        then.status(429);
    });
    let broken = server.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(500);
    });
    let teapot = server.mock(|when, then| {
        when.method(GET).path("/teapot");
        then.status(418);
    });

    let client = crate::common::client_builder(&server)
        .retry(crate::common::no_retry())
        .disable_cache()
        .build()
        .unwrap();

    let err = client.get::<Value>("limited").await.unwrap_err();
    limited.assert();
    assert!(matches!(err, ApiError::RateLimited { .. }));
    assert_eq!(err.status(), Some(429));

    let err = client.get::<Value>("broken").await.unwrap_err();
    broken.assert();
    assert!(matches!(err, ApiError::ServerError { status: 500, .. }));

    // anything else keeps its raw status
    let err = client.get::<Value>("teapot").await.unwrap_err();
    teapot.assert();
    assert!(matches!(err, ApiError::Status { status: 418, .. }));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({"v": 1}))
            .delay(Duration::from_millis(500));
    });

    let client = crate::common::client_builder(&server)
        .disable_cache()
        .build()
        .unwrap();

    let err = client
        .request(Method::GET, "slow")
        .retry_policy(Some(crate::common::no_retry()))
        .timeout(Duration::from_millis(100))
        .fetch::<Value>()
        .await
        .unwrap_err();
    mock.assert();
    assert!(matches!(err, ApiError::Timeout { .. }));
    assert_eq!(err.status(), Some(408));
}

#[tokio::test]
async fn malformed_json_surfaces_as_json_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/bad");
        then.status(200).body("definitely not json");
    });

    let client = crate::common::test_client(&server);

    let err = client.get::<Value>("bad").await.unwrap_err();
    mock.assert();
    assert!(matches!(err, ApiError::Json(_)));
}

#[tokio::test]
async fn empty_bodies_deserialize_as_null() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/sessions/9");
        then.status(204);
    });

    let client = crate::common::test_client(&server);

    let gone = client.delete::<Option<Value>>("sessions/9").await.unwrap();
    mock.assert();
    assert_eq!(gone.status, 204);
    assert!(gone.data.is_none());
}

#[tokio::test]
async fn missing_base_url_is_a_config_error() {
    let err = ApiClient::builder().build().unwrap_err();
    assert!(matches!(err, ApiError::Config(_)));
}
