use thiserror::Error;

/// Message fragments that mark an opaque failure as connectivity trouble.
///
/// Used when a failure carries no HTTP status and no typed cause, e.g. an
/// injected probe or a wrapped transport error that only surfaces a string.
const TRANSIENT_MESSAGE_MARKERS: [&str; 6] = [
    "network",
    "timeout",
    "connection",
    "fetch",
    "econnrefused",
    "enotfound",
];

/// Classify an opaque failure message: `true` when it reads like a transient
/// connectivity problem rather than a terminal one.
///
/// The match is case-insensitive and purely textual, so it is only consulted
/// when nothing better (a status code, a typed transport error) is available.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MESSAGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// The primary error type for all fallible operations in this crate.
///
/// Errors are classified once, at the boundary where the raw failure is
/// observed, and never rewrapped afterwards: what callers see after exhausted
/// retries is the last observed error, with the original status and message
/// intact.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A connectivity-level failure with no HTTP status (DNS, refused
    /// connection, reset stream, and the like).
    #[error("network error: {message}")]
    Network {
        /// Human-readable description of the failure.
        message: String,
        /// Whether the failure looked transient at classification time.
        retryable: bool,
        /// The underlying transport error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request deadline fired before a response arrived.
    ///
    /// Reported as status 408 by [`ApiError::status`], and retryable under the
    /// default policy.
    #[error("request timed out: {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The upstream answered 404.
    #[error("resource not found: {url}")]
    NotFound {
        /// The URL that was not found.
        url: String,
    },

    /// The upstream answered 429.
    #[error("rate limited by upstream: {url}")]
    RateLimited {
        /// The URL that throttled us.
        url: String,
    },

    /// The upstream answered with a 5xx status.
    #[error("server error {status} at {url}")]
    ServerError {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
    },

    /// The upstream answered with an unexpected status not covered by a more
    /// specific variant.
    #[error("unexpected response status: {status} at {url}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
    },

    /// The circuit breaker is open; the call was rejected without any network
    /// attempt.
    #[error("circuit breaker is open; request rejected without a network attempt")]
    CircuitOpen,

    /// The connection monitor reports the client offline; the call was
    /// rejected without any network attempt.
    #[error("client is offline; request not attempted")]
    Offline,

    /// A request body could not be serialized, or a response body could not be
    /// parsed, as JSON.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A provided URL could not be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The client was misconfigured (e.g. a missing base URL).
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Classify a transport-level failure from the HTTP stack.
    ///
    /// Timeouts become [`ApiError::Timeout`]; connect/request/body failures
    /// become retryable [`ApiError::Network`]; anything else falls back to the
    /// textual classifier.
    pub(crate) fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let url = err.url().map_or_else(|| url.to_string(), ToString::to_string);
        if err.is_timeout() {
            return Self::Timeout { url };
        }
        let message = err.to_string();
        let retryable =
            err.is_connect() || err.is_request() || err.is_body() || is_transient_message(&message);
        Self::Network {
            message,
            retryable,
            source: Some(Box::new(err)),
        }
    }

    /// Classify a status-coded upstream failure.
    pub(crate) fn from_status(status: u16, url: &str) -> Self {
        let url = url.to_string();
        match status {
            404 => Self::NotFound { url },
            429 => Self::RateLimited { url },
            500..=599 => Self::ServerError { status, url },
            _ => Self::Status { status, url },
        }
    }

    /// Classify an opaque failure by its message alone.
    ///
    /// The textual classifier decides retryability; use this for errors that
    /// cross a boundary as plain strings.
    pub fn network_from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let retryable = is_transient_message(&message);
        Self::Network {
            message,
            retryable,
            source: None,
        }
    }

    /// The HTTP status associated with this error, if any.
    ///
    /// Timeouts report 408 so callers can key friendly messages off a single
    /// status, exactly like a status-coded failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Timeout { .. } => Some(408),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a connectivity-level failure rather than an upstream
    /// verdict about the request.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::Offline
        )
    }
}
