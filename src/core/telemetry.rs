//! Best-effort monitoring hooks.
//!
//! Breaker transitions, retry waits, connectivity changes, and stale-cache
//! fallbacks are reported to a [`TelemetrySink`] so operators can watch the
//! resilience machinery work. Sinks run synchronously on the call path and
//! must not block: fan out to counters or channels, not to I/O.

use std::fmt;

/// Severity attached to a telemetry event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Lowercase label, convenient for log lines and metric tags.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives resilience events emitted by the client.
///
/// `source` identifies the emitting component (`"retry"`, `"circuit_breaker"`,
/// `"cache"`, `"connectivity"`), `event` the specific occurrence within it.
/// Attributes are small key/value pairs; implementations that do not care can
/// ignore them. Failures inside a sink must never propagate into the request
/// path.
pub trait TelemetrySink: Send + Sync {
    fn record_event(&self, source: &str, event: &str, severity: Severity, attrs: &[(&str, String)]);
}

/// Discards every event; used when no sink is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record_event(&self, _: &str, _: &str, _: Severity, _: &[(&str, String)]) {}
}

/// Forwards events to the `tracing` ecosystem at the matching level.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetry;

#[cfg(feature = "tracing")]
impl TelemetrySink for TracingTelemetry {
    fn record_event(&self, source: &str, event: &str, severity: Severity, attrs: &[(&str, String)]) {
        match severity {
            Severity::Debug => tracing::debug!(source, event, ?attrs, "telemetry"),
            Severity::Info => tracing::info!(source, event, ?attrs, "telemetry"),
            Severity::Warn => tracing::warn!(source, event, ?attrs, "telemetry"),
            Severity::Error => tracing::error!(source, event, ?attrs, "telemetry"),
        }
    }
}
