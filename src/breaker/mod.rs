//! Circuit breaker guarding a failing upstream.
//!
//! After enough consecutive transient failures the circuit opens and calls are
//! rejected without touching the network. Once the cooldown has elapsed the
//! next [`CircuitBreaker::is_open`] check moves the circuit to half-open and
//! lets a single probe through: a success closes it, a failure re-opens it for
//! another full cooldown.
//!
//! ```text
//! Closed --- threshold failures ---> Open
//!    ^                                |  reset_timeout elapsed
//!    |                                v
//!    +------ probe success ------ HalfOpen --- probe failure ---> Open
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::core::telemetry::{NoopTelemetry, Severity, TelemetrySink};

/// The three classic breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; failures are being counted.
    Closed,
    /// Calls are rejected outright until the cooldown elapses.
    Open,
    /// One probe call is allowed through to test the upstream.
    HalfOpen,
}

impl CircuitState {
    /// Lowercase label, convenient for log lines and metric tags.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Tuning for a [`CircuitBreaker`].
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open after the last recorded failure before
    /// a half-open probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of a breaker, as returned by
/// [`crate::ApiClient::breaker_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// The state at the moment of the snapshot.
    pub state: CircuitState,
    /// Failures accumulated since the circuit last closed.
    pub failure_count: u32,
}

/// Which population of calls shares one breaker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakerScope {
    /// Every call the client makes shares a single breaker (the default).
    #[default]
    Global,
    /// One breaker per endpoint path, so a single failing route cannot get
    /// every other route rejected.
    PerEndpoint,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

/// Failure tracker with three states and time-based recovery.
///
/// The failure count is cumulative until a success: a failed half-open probe
/// re-opens the circuit and keeps counting up, so the count reflects the whole
/// outage, not just the last window. Only [`record_success`] resets it.
///
/// [`record_success`]: CircuitBreaker::record_success
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    config: CircuitBreakerConfig,
    telemetry: Arc<dyn TelemetrySink>,
}

impl CircuitBreaker {
    /// A closed breaker with the given thresholds.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_telemetry(config, Arc::new(NoopTelemetry))
    }

    pub(crate) fn with_telemetry(
        config: CircuitBreakerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
            }),
            config,
            telemetry,
        }
    }

    /// Returns whether calls must currently be rejected.
    ///
    /// This is the state-advancing check: when the open cooldown has elapsed,
    /// the call itself moves the circuit to half-open and returns `false`,
    /// handing the caller the probe opportunity. Consult it once per attempt,
    /// immediately before the attempt.
    pub fn is_open(&self) -> bool {
        let mut transitioned = None;
        let open = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => false,
                CircuitState::Open => {
                    let cooled = inner
                        .last_failure_at
                        .is_none_or(|at| at.elapsed() >= self.config.reset_timeout);
                    if cooled {
                        inner.state = CircuitState::HalfOpen;
                        transitioned = Some(inner.failure_count);
                    }
                    !cooled
                }
            }
        };
        if let Some(failures) = transitioned {
            self.emit(CircuitState::HalfOpen, failures);
        }
        open
    }

    /// Records a failed call outcome.
    ///
    /// Increments the failure count and refreshes the cooldown clock. The
    /// circuit opens when the count reaches the threshold, or immediately when
    /// a half-open probe fails.
    pub fn record_failure(&self) {
        let mut opened = None;
        {
            let mut inner = self.lock();
            inner.failure_count += 1;
            inner.last_failure_at = Some(Instant::now());
            let trips = inner.state == CircuitState::HalfOpen
                || inner.failure_count >= self.config.failure_threshold;
            if trips && inner.state != CircuitState::Open {
                inner.state = CircuitState::Open;
                opened = Some(inner.failure_count);
            }
        }
        if let Some(failures) = opened {
            self.emit(CircuitState::Open, failures);
        }
    }

    /// Records a successful call outcome: the circuit closes and the failure
    /// count resets, whatever the current state.
    pub fn record_success(&self) {
        let was = {
            let mut inner = self.lock();
            let was = inner.state;
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.last_failure_at = None;
            was
        };
        if was != CircuitState::Closed {
            self.emit(CircuitState::Closed, 0);
        }
    }

    /// Point-in-time state and failure count.
    ///
    /// Purely observational: an open breaker whose cooldown has elapsed still
    /// reports `Open` here until the next [`is_open`] check advances it.
    ///
    /// [`is_open`]: CircuitBreaker::is_open
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, state: CircuitState, failures: u32) {
        #[cfg(feature = "tracing")]
        match state {
            CircuitState::Open => tracing::warn!(failures, "circuit breaker opened"),
            CircuitState::HalfOpen => tracing::debug!(failures, "circuit breaker half-open"),
            CircuitState::Closed => tracing::info!("circuit breaker closed"),
        }
        let severity = if state == CircuitState::Open {
            Severity::Warn
        } else {
            Severity::Info
        };
        self.telemetry.record_event(
            "circuit_breaker",
            "state_change",
            severity,
            &[
                ("state", state.as_str().to_string()),
                ("failures", failures.to_string()),
            ],
        );
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/* ---------------- scope registry ---------------- */

/// Hands out breakers according to the configured [`BreakerScope`].
///
/// Under `Global` every caller gets the same breaker. Under `PerEndpoint`
/// breakers are keyed by the resolved URL path (callers resolve endpoint
/// spellings before lookup; any query string is stripped here) and created
/// lazily on first use.
pub(crate) struct BreakerRegistry {
    scope: BreakerScope,
    config: CircuitBreakerConfig,
    telemetry: Arc<dyn TelemetrySink>,
    global: Arc<CircuitBreaker>,
    per_endpoint: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub(crate) fn new(
        scope: BreakerScope,
        config: CircuitBreakerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let global = Arc::new(CircuitBreaker::with_telemetry(
            config.clone(),
            telemetry.clone(),
        ));
        Self {
            scope,
            config,
            telemetry,
            global,
            per_endpoint: Mutex::new(HashMap::new()),
        }
    }

    /// The breaker guarding the route at `path` (everything shares one under
    /// `Global`).
    pub(crate) fn breaker_for(&self, path: &str) -> Arc<CircuitBreaker> {
        match self.scope {
            BreakerScope::Global => Arc::clone(&self.global),
            BreakerScope::PerEndpoint => {
                let key = path.split('?').next().unwrap_or(path).to_owned();
                let mut map = self
                    .per_endpoint
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                Arc::clone(map.entry(key).or_insert_with(|| {
                    Arc::new(CircuitBreaker::with_telemetry(
                        self.config.clone(),
                        self.telemetry.clone(),
                    ))
                }))
            }
        }
    }

    pub(crate) fn global_snapshot(&self) -> BreakerSnapshot {
        self.global.snapshot()
    }

    pub(crate) fn snapshot_for(&self, path: &str) -> BreakerSnapshot {
        self.breaker_for(path).snapshot()
    }
}
