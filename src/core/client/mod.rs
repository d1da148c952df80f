//! Public client surface + builder.
//! Internals are split into `retry` (policy + executor) and `request` (the
//! per-call builder and send pipeline); `constants` holds the defaults.

mod constants;
mod request;
mod retry;

pub use request::ApiRequestBuilder;
pub use retry::{Backoff, CacheMode, RetryConfig, run_with_retry};

use std::{fmt, sync::Arc, time::Duration};

use reqwest::{Method, header::HeaderMap};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::{
    breaker::{BreakerRegistry, BreakerScope, BreakerSnapshot, CircuitBreakerConfig},
    cache::{CacheStats, ResponseCache},
    connectivity::{ConnectionMonitor, HttpHealthProbe, MonitorConfig, Subscription},
    core::{
        error::ApiError,
        telemetry::{NoopTelemetry, TelemetrySink},
    },
};
use constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_HEALTH_PATH, DEFAULT_TIMEOUT, USER_AGENT,
};

/// A response that came through the resilience pipeline.
#[derive(Clone, Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body.
    pub data: T,
    /// HTTP status of the live response, or of the original response when
    /// served from cache.
    pub status: u16,
    /// Response headers (the captured ones when served from cache).
    pub headers: HeaderMap,
    /// Whether the value came from the cache instead of the network, either as
    /// a fresh hit or as a stale fallback after a failed call.
    pub from_cache: bool,
}

/// What the client keeps per cache key: enough to rebuild a full
/// [`ApiResponse`] later.
#[derive(Clone, Debug)]
pub(crate) struct CachedResponse {
    pub(crate) status: u16,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
}

/// Resilient JSON API client.
///
/// Every call runs through the same pipeline: fresh-cache check, connectivity
/// gate, circuit breaker gate, retried send with jittered backoff, cache
/// write-through. GETs that fail after all of that are served stale from the
/// cache when possible; mutating verbs never touch the cache.
///
/// The client is cheap to clone; clones share the cache, the breakers, and
/// the connection monitor.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
    cache: Option<Arc<ResponseCache<CachedResponse>>>,
    breakers: Arc<BreakerRegistry>,
    monitor: ConnectionMonitor,
    telemetry: Arc<dyn TelemetrySink>,
}

// Manual impl: the monitor, breaker registry, and telemetry sink hold
// non-`Debug` trait objects.
impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /* -------- verb helpers -------- */

    /// GET `endpoint` and deserialize the JSON response.
    ///
    /// Fresh cache hits are served without touching the network; when the live
    /// call fails and a cached value exists (however old), the stale value is
    /// served instead of the error.
    ///
    /// # Errors
    /// The classified error of the last attempt when no cached value can
    /// rescue the call.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(Method::GET, endpoint).fetch().await
    }

    /// POST `body` (serialized as JSON) to `endpoint`.
    ///
    /// Mutating verbs are never cached and never served stale.
    ///
    /// # Errors
    /// Serialization failures surface as [`ApiError::Json`] before any network
    /// attempt; otherwise the classified error of the last attempt.
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.request(Method::POST, endpoint).json(body)?.fetch().await
    }

    /// PUT `body` (serialized as JSON) to `endpoint`.
    ///
    /// # Errors
    /// Same contract as [`post`](ApiClient::post).
    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.request(Method::PUT, endpoint).json(body)?.fetch().await
    }

    /// DELETE `endpoint`.
    ///
    /// # Errors
    /// The classified error of the last attempt.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(Method::DELETE, endpoint).fetch().await
    }

    /// Start a request with per-call control over cache mode, TTL, retry
    /// policy, and timeout. The verb helpers above are thin wrappers.
    pub fn request(&self, method: Method, endpoint: &str) -> ApiRequestBuilder {
        ApiRequestBuilder::new(self, method, endpoint)
    }

    /* -------- operational surface -------- */

    /// State and failure count of the client-wide breaker.
    pub fn breaker_state(&self) -> BreakerSnapshot {
        self.breakers.global_snapshot()
    }

    /// Breaker snapshot for one endpoint. Equal to [`breaker_state`] unless
    /// the client was built with [`BreakerScope::PerEndpoint`].
    ///
    /// The endpoint is resolved against the base URL first, so spellings that
    /// reach the same route (`"items"`, `"./items"`, `"items?page=2"`) report
    /// the same breaker the request pipeline uses.
    ///
    /// [`breaker_state`]: ApiClient::breaker_state
    pub fn breaker_state_for(&self, endpoint: &str) -> BreakerSnapshot {
        self.breakers.snapshot_for(&self.breaker_key(endpoint))
    }

    /// The connection monitor: signals, state, and subscriptions.
    pub fn connectivity(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    /// Register a connectivity callback; fires immediately with the current
    /// state. Shorthand for `connectivity().subscribe(..)`.
    pub fn on_connection_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        self.monitor.subscribe(callback)
    }

    /// Whether response caching is enabled.
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }

    /// Resident size and keys of the response cache (empty when caching is
    /// disabled).
    pub async fn cache_stats(&self) -> CacheStats {
        match &self.cache {
            Some(cache) => cache.stats().await,
            None => CacheStats::default(),
        }
    }

    /* -------- internal getters used by the request pipeline -------- */

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }
    pub(crate) fn default_retry(&self) -> &RetryConfig {
        &self.retry
    }
    pub(crate) fn cache(&self) -> Option<&Arc<ResponseCache<CachedResponse>>> {
        self.cache.as_ref()
    }
    pub(crate) fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }
    /// Registry key for an endpoint: its resolved URL path, matching what the
    /// request pipeline derives for the same spelling.
    pub(crate) fn breaker_key(&self, endpoint: &str) -> String {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_or_else(|_| endpoint.to_owned(), |url| url.path().to_owned())
    }
    pub(crate) fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    breaker: Option<CircuitBreakerConfig>,
    breaker_scope: BreakerScope,
    cache_ttl: Option<Duration>,
    cache_capacity: Option<usize>,
    cache_disabled: bool,
    health_path: Option<String>,
    connectivity: Option<MonitorConfig>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl ApiClientBuilder {
    /// The base URL every endpoint is joined onto. Required.
    ///
    /// A trailing slash is added when missing, so `…/v1` and `…/v1/` behave
    /// the same and endpoints always extend the base path.
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Override the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Overall per-attempt timeout. Default: 30s.
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Set a connect timeout. Default: none.
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// Default retry policy for every call (overridable per request).
    pub fn retry(mut self, cfg: RetryConfig) -> Self {
        self.retry = Some(cfg);
        self
    }

    /// Circuit breaker thresholds. Default: 5 failures, 60s cooldown.
    pub fn breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = Some(cfg);
        self
    }

    /// One shared breaker (default) or one per endpoint path.
    pub fn breaker_scope(mut self, scope: BreakerScope) -> Self {
        self.breaker_scope = scope;
        self
    }

    /// Default TTL for cached GET responses. Default: 5 minutes.
    pub fn cache_ttl(mut self, dur: Duration) -> Self {
        self.cache_ttl = Some(dur);
        self
    }

    /// Cache capacity bound. Default: 50 entries.
    pub fn cache_capacity(mut self, max_entries: usize) -> Self {
        self.cache_capacity = Some(max_entries);
        self
    }

    /// Disable response caching entirely. This also disables stale-on-error
    /// fallbacks, which have nothing to fall back to.
    pub fn disable_cache(mut self) -> Self {
        self.cache_disabled = true;
        self
    }

    /// Path of the health endpoint probed while offline, joined onto the base
    /// URL. Default: `health`.
    pub fn health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Reconnection probing behavior while offline.
    pub fn connectivity(mut self, cfg: MonitorConfig) -> Self {
        self.connectivity = Some(cfg);
        self
    }

    /// Telemetry sink receiving breaker, retry, connectivity, and fallback
    /// events.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// # Errors
    /// [`ApiError::Config`] when no base URL was given or the HTTP client
    /// cannot be constructed; [`ApiError::Url`] when the health path does not
    /// join onto the base URL.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let mut base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("base_url is required".into()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut httpb = reqwest::Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT))
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT));
        if let Some(ct) = self.connect_timeout {
            httpb = httpb.connect_timeout(ct);
        }
        let http = httpb
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        let telemetry: Arc<dyn TelemetrySink> =
            self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry));

        let health_url =
            base_url.join(self.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH))?;
        let monitor = ConnectionMonitor::with_telemetry(
            Arc::new(HttpHealthProbe::new(http.clone(), health_url)),
            self.connectivity.unwrap_or_default(),
            Arc::clone(&telemetry),
        );

        let breakers = Arc::new(BreakerRegistry::new(
            self.breaker_scope,
            self.breaker.unwrap_or_default(),
            Arc::clone(&telemetry),
        ));

        let cache = if self.cache_disabled {
            None
        } else {
            Some(Arc::new(ResponseCache::new(
                self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
                self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            )))
        };

        Ok(ApiClient {
            http,
            base_url,
            retry: self.retry.unwrap_or_default(),
            cache,
            breakers,
            monitor,
            telemetry,
        })
    }
}
