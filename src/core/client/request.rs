//! Per-call request builder and the send pipeline behind it.
//!
//! The pipeline layers cache semantics over retry semantics: fresh-cache
//! check, connectivity gate, then the retried send with the circuit breaker
//! consulted per attempt, then cache write-through. Any live-path failure on a
//! GET is intercepted for a stale-cache rescue before it reaches the caller.

use std::time::Duration;

use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use super::{ApiClient, ApiResponse, CacheMode, CachedResponse, RetryConfig, run_with_retry};
use crate::core::{error::ApiError, net, telemetry::Severity};

/// A builder for one resilient API call.
///
/// Created by [`ApiClient::request`]; the verb helpers on the client are thin
/// wrappers around it. Terminal method: [`fetch`](ApiRequestBuilder::fetch).
pub struct ApiRequestBuilder {
    client: ApiClient,
    method: Method,
    endpoint: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    cache_mode: CacheMode,
    cache_ttl: Option<Duration>,
    retry_override: Option<RetryConfig>,
    timeout: Option<Duration>,
}

impl ApiRequestBuilder {
    pub(crate) fn new(client: &ApiClient, method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            cache_mode: CacheMode::Use,
            cache_ttl: None,
            retry_override: None,
            timeout: None,
        }
    }

    /// Sets the cache behavior for this call. GETs only; other verbs never
    /// touch the cache regardless of mode.
    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Overrides the TTL for the cache entry this call writes.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Overrides the client's retry policy for this call (`None` restores the
    /// client default).
    #[must_use]
    pub fn retry_policy(mut self, cfg: Option<RetryConfig>) -> Self {
        self.retry_override = cfg;
        self
    }

    /// Per-attempt timeout for this call only.
    #[must_use]
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Appends a query pair.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a JSON body, serialized eagerly so a bad payload fails here
    /// rather than mid-pipeline.
    ///
    /// # Errors
    /// [`ApiError::Json`] when `body` cannot be serialized.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Executes the call through the resilience pipeline and deserializes the
    /// JSON response. An empty body deserializes as JSON `null`, so 204-style
    /// responses work with `Option<T>` or `()` targets.
    ///
    /// # Errors
    /// The classified error of the last attempt once retries are exhausted,
    /// the breaker rejects the call, or the client is offline; GETs with a
    /// cached value are served stale instead of erroring.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip(self),
            err,
            fields(method = %self.method, endpoint = %self.endpoint)
        )
    )]
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        let (raw, from_cache) = self.dispatch().await?;
        let data = decode_body(&raw.body)?;
        Ok(ApiResponse {
            data,
            status: raw.status,
            headers: raw.headers,
            from_cache,
        })
    }

    async fn dispatch(self) -> Result<(CachedResponse, bool), ApiError> {
        let url = build_url(self.client.base_url(), &self.endpoint, &self.query)?;
        let cache = if self.method == Method::GET {
            self.client.cache()
        } else {
            None
        };
        let write_back = self.cache_mode != CacheMode::Bypass;
        let key = cache_key(&self.method, &url, self.body.as_ref());

        // Fresh hit: no network, no breaker, no retry budget spent. Expired
        // entries stay resident so the stale rescue below can still use them.
        if self.cache_mode == CacheMode::Use
            && let Some(cache) = cache
            && let Some(hit) = cache.get_fresh(&key).await
        {
            return Ok((hit, true));
        }

        // Offline: any cached value, however old, beats an error.
        if !self.client.connectivity().is_online() {
            if write_back
                && let Some(cache) = cache
                && let Some(stale) = cache.peek_stale(&key).await
            {
                self.note_fallback("offline_fallback", &ApiError::Offline);
                return Ok((stale, true));
            }
            return Err(ApiError::Offline);
        }

        // Key the breaker on the resolved path so spelling variants of one
        // route ("items", "./items") share state.
        let breaker = self.client.breakers().breaker_for(url.path());
        let retry_cfg = self
            .retry_override
            .as_ref()
            .unwrap_or_else(|| self.client.default_retry());

        let outcome = run_with_retry(
            retry_cfg,
            Some(&breaker),
            |next_attempt, err| {
                self.client.telemetry().record_event(
                    "retry",
                    "attempt",
                    Severity::Info,
                    &[
                        ("endpoint", self.endpoint.clone()),
                        ("attempt", next_attempt.to_string()),
                        ("error", err.to_string()),
                    ],
                );
            },
            |_attempt| {
                let request = self.assemble(&url);
                let url_str = url.to_string();
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| ApiError::from_reqwest(e, &url_str))?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(ApiError::from_status(status.as_u16(), &url_str));
                    }
                    let (status, headers, body) = net::read_response(resp).await?;
                    Ok(CachedResponse {
                        status,
                        headers,
                        body,
                    })
                }
            },
        )
        .await;

        match outcome {
            Ok(raw) => {
                if write_back && let Some(cache) = cache {
                    match self.cache_ttl {
                        Some(ttl) => cache.insert_with_ttl(key, raw.clone(), ttl).await,
                        None => cache.insert(key, raw.clone()).await,
                    }
                }
                Ok((raw, false))
            }
            Err(err) => {
                // Stale rescue: exhausted retries and breaker rejections alike.
                if write_back
                    && let Some(cache) = cache
                    && let Some(stale) = cache.peek_stale(&key).await
                {
                    self.note_fallback("stale_fallback", &err);
                    return Ok((stale, true));
                }
                Err(err)
            }
        }
    }

    /// Build a fresh transport request; called once per attempt since a sent
    /// request cannot be reused.
    fn assemble(&self, url: &Url) -> reqwest::RequestBuilder {
        let mut request = self.client.http().request(self.method.clone(), url.clone());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    fn note_fallback(&self, event: &str, err: &ApiError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(endpoint = %self.endpoint, error = %err, "serving stale cached response");
        self.client.telemetry().record_event(
            "cache",
            event,
            Severity::Warn,
            &[
                ("endpoint", self.endpoint.clone()),
                ("error", err.to_string()),
            ],
        );
    }
}

/// Join `endpoint` onto `base` and append query pairs. A leading slash on the
/// endpoint is treated as relative, so it extends the base path instead of
/// replacing it.
fn build_url(base: &Url, endpoint: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let mut url = base.join(endpoint.trim_start_matches('/'))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Deterministic cache key: method, full URL, and serialized body. The URL
/// never contains a literal space, so the space delimiter keeps distinct
/// requests distinct.
pub(crate) fn cache_key(method: &Method, url: &Url, body: Option<&serde_json::Value>) -> String {
    match body {
        Some(body) => format!("{method} {url} {body}"),
        None => format!("{method} {url} "),
    }
}

fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        Ok(serde_json::from_str("null")?)
    } else {
        Ok(serde_json::from_str(trimmed)?)
    }
}
