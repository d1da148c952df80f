//! backstop: a resilient client for JSON APIs that sometimes let you down.
//!
//! Every call through [`ApiClient`] runs the same pipeline between the caller
//! and an unreliable upstream:
//!
//! - automatic retries with exponential, jittered backoff ([`RetryConfig`],
//!   [`Backoff`])
//! - a three-state circuit breaker that stops hammering a failing upstream
//!   ([`breaker`])
//! - a bounded TTL response cache that doubles as the fallback source of
//!   truth during outages ([`cache`])
//! - online/offline tracking with scheduled reconnection probes
//!   ([`connectivity`])
//!
//! ```no_run
//! use backstop::ApiClient;
//! use url::Url;
//!
//! # #[derive(serde::Deserialize)]
//! # struct Overview { score: f64 }
//! # async fn demo() -> Result<(), backstop::ApiError> {
//! let client = ApiClient::builder()
//!     .base_url(Url::parse("https://api.example.com/v1/")?)
//!     .build()?;
//!
//! let overview = client.get::<Overview>("reports/overview").await?;
//! if overview.from_cache {
//!     // last-known-good value: fresh hit, or stale rescue after a failure
//! }
//! # Ok(()) }
//! ```

/// Circuit breaker: three states, failure counting, timed recovery.
pub mod breaker;
/// Bounded TTL response store with a separate stale-read path.
pub mod cache;
/// Online/offline tracking and reconnection probing.
pub mod connectivity;
/// The client facade, error taxonomy, and shared plumbing.
pub mod core;

pub use breaker::{
    BreakerScope, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use cache::{CacheStats, ResponseCache};
pub use connectivity::{
    ConnectionMonitor, ConnectionState, HealthProbe, HttpHealthProbe, MonitorConfig, Subscription,
};
pub use self::core::client::{
    ApiClient, ApiClientBuilder, ApiRequestBuilder, ApiResponse, Backoff, CacheMode, RetryConfig,
    run_with_retry,
};
pub use self::core::error::{ApiError, is_transient_message};
pub use self::core::telemetry::{NoopTelemetry, Severity, TelemetrySink};

#[cfg(feature = "tracing")]
pub use self::core::telemetry::TracingTelemetry;

// The verb helpers cover common calls; `ApiClient::request` takes the method
// explicitly, so re-export it rather than make callers depend on reqwest.
pub use reqwest::Method;
