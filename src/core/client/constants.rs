//! Centralized defaults for the client builder.

use std::time::Duration;

/// Default User-Agent (crate name and version).
pub(crate) const USER_AGENT: &str = concat!("backstop/", env!("CARGO_PKG_VERSION"));

/// Default overall budget for a single request attempt.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TTL for cached GET responses.
pub(crate) const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default cache capacity; a new key past this bound evicts the
/// oldest-inserted entry.
pub(crate) const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Health-check path probed while offline, joined onto the base URL.
pub(crate) const DEFAULT_HEALTH_PATH: &str = "health";
