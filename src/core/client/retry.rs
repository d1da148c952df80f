use std::time::Duration;

use rand::Rng;

use crate::{breaker::CircuitBreaker, core::error::ApiError};

/// Specifies the backoff strategy for retrying failed requests.
#[derive(Clone, Debug)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed(Duration),
    /// Uses an exponential delay between retries.
    /// The delay is calculated as `base * (factor ^ attempt)`, capped at `max`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to add random jitter (up to +30%) to the capped delay.
        jitter: bool,
    },
}

impl Backoff {
    /// The delay to wait after `attempt` tries have already failed (so the
    /// first retry waits `delay_for(0)`).
    ///
    /// Without jitter the sequence is non-decreasing up to the cap. Jitter
    /// adds a uniform extra of at most 30% of the capped delay, so the result
    /// never exceeds `max * 1.3`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let raw = base.as_secs_f64() * factor.powf(f64::from(attempt));
                let capped = if raw.is_finite() {
                    raw.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };
                let total = if *jitter {
                    capped + rand::thread_rng().gen_range(0.0..0.3) * capped
                } else {
                    capped
                };
                Duration::from_secs_f64(total.max(0.0))
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// The maximum number of retries to attempt. The total number of attempts will be `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
    /// A list of HTTP status codes that should trigger a retry.
    pub retry_on_status: Vec<u16>,
    /// Whether to retry on request timeouts.
    pub retry_on_timeout: bool,
    /// Whether to retry on connection errors.
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(1000),
                factor: 2.0,
                max: Duration::from_secs(10),
                jitter: true,
            },
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    /// Whether `err` warrants another attempt under this policy.
    ///
    /// Status-coded failures retry when their status is listed in
    /// `retry_on_status`; timeouts and connection-level failures follow their
    /// dedicated toggles. Everything else (4xx verdicts, parse errors,
    /// breaker/offline rejections) is terminal.
    pub fn should_retry(&self, err: &ApiError) -> bool {
        match err {
            ApiError::Timeout { .. } => self.retry_on_timeout,
            ApiError::Network { retryable, .. } => self.retry_on_connect && *retryable,
            ApiError::NotFound { .. }
            | ApiError::RateLimited { .. }
            | ApiError::ServerError { .. }
            | ApiError::Status { .. } => err
                .status()
                .is_some_and(|status| self.retry_on_status.contains(&status)),
            _ => false,
        }
    }
}

/// Defines the behavior of the in-memory response cache for an API call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present; otherwise, fetch from the network
    /// and write the response to the cache. (Default)
    Use,
    /// Always fetch from the network, bypassing any cached entry, and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

/// Runs `operation` under the retry policy, consulting `breaker` before every
/// attempt and announcing waits through `on_retry`.
///
/// The operation is invoked at most `max_retries + 1` times (exactly once when
/// retries are disabled), and receives the zero-based attempt number. A
/// non-retryable error is returned immediately, whatever the remaining budget;
/// on exhaustion the error surfaced is the last one observed, never a wrapper.
///
/// Every failure the policy considers retryable is recorded on the breaker,
/// and any success resets it. Terminal upstream verdicts (a 404, say) are not
/// recorded, so a misbehaving caller cannot trip the circuit for everyone
/// else. When the breaker reports open the pending attempt is abandoned and
/// [`ApiError::CircuitOpen`] is returned without a network call.
///
/// `on_retry` fires after a retryable failure with the attempt number about to
/// run (1-based, matching "retry #n") and the error that caused it, before the
/// backoff sleep.
///
/// # Errors
/// The last observed operation error, or [`ApiError::CircuitOpen`].
pub async fn run_with_retry<T, F, Fut, H>(
    config: &RetryConfig,
    breaker: Option<&CircuitBreaker>,
    mut on_retry: H,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    H: FnMut(u32, &ApiError),
{
    let budget = if config.enabled { config.max_retries } else { 0 };
    let mut attempt: u32 = 0;
    loop {
        if let Some(b) = breaker
            && b.is_open()
        {
            return Err(ApiError::CircuitOpen);
        }
        match operation(attempt).await {
            Ok(value) => {
                if let Some(b) = breaker {
                    b.record_success();
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = config.should_retry(&err);
                if retryable && let Some(b) = breaker {
                    b.record_failure();
                }
                if !retryable || attempt >= budget {
                    return Err(err);
                }
                let delay = config.backoff.delay_for(attempt);
                on_retry(attempt + 1, &err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
