//! Request pipeline for the APSpace web services
//!
//! Every call goes through the same steps:
//!
//! 1. Connectivity check. On a device runtime with no connection a GET is
//!    answered from the store alone and a mutating call fails fast.
//! 2. A fresh service ticket is minted for the service base URL and attached
//!    as the `ticket` query parameter. Ticket failures abort the call.
//! 3. GETs retry transient failures with backoff, then apply the caching
//!    strategy. Client errors are returned as-is, never retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt, Shared, WeakShared};
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{CachingStrategy, HttpRequest, RequestOptions, RetryPolicy, Transport};
use crate::cache::{KeyValueStore, endpoint_key};
use crate::cas::TicketService;
use crate::error::{ApiError, ApiResult, Result};
use crate::network::NetworkMonitor;

/// Default APSpace web-service base URL
pub const DEFAULT_API_URL: &str = "https://api.apiit.edu.my";

/// Default per-attempt request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Tunables of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub api_url: String,
    pub retry: RetryPolicy,
    pub caching: CachingStrategy,
    pub request_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            retry: RetryPolicy::default(),
            caching: CachingStrategy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

type SharedGet = BoxFuture<'static, ApiResult<Option<Value>>>;

/// Where a value handed back by [`WsApi::get_with_origin`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Network,
    Cache,
}

/// Authenticated, cached, retrying access to the web services.
///
/// Cheap to clone; clones share the in-flight table, so concurrent
/// [`WsApi::get_value`] calls for the same request share one fetch.
#[derive(Clone)]
pub struct WsApi {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    tickets: Arc<TicketService>,
    store: Arc<dyn KeyValueStore>,
    network: NetworkMonitor,
    settings: PipelineSettings,
    in_flight: Mutex<HashMap<String, WeakShared<SharedGet>>>,
}

impl WsApi {
    pub fn new(
        transport: Arc<dyn Transport>,
        tickets: Arc<TicketService>,
        store: Arc<dyn KeyValueStore>,
        network: NetworkMonitor,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                tickets,
                store,
                network,
                settings,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// GET as a stream of values.
    ///
    /// Yields nothing for an offline cache miss, one value for most
    /// strategies, and up to two (cached, then network) for
    /// [`CachingStrategy::CacheUpdateRefresh`]. Dropping the stream stops any
    /// pending retry.
    pub fn get_stream(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> BoxStream<'static, ApiResult<Value>> {
        let inner = Arc::clone(&self.inner);
        let endpoint = endpoint.to_string();
        let key = options.store_key(&endpoint);

        if !options.refresh && inner.network.is_device_offline() {
            debug!("Offline, serving {} from cache", key);
            return stream::once(async move { inner.read_cache(&key).await })
                .filter_map(|cached| future::ready(cached.map(Ok)))
                .boxed();
        }

        match options.caching.unwrap_or(inner.settings.caching) {
            CachingStrategy::CacheOnly => {
                stream::once(async move { inner.fetch_with_retry(&endpoint, &options).await })
                    .boxed()
            }
            CachingStrategy::NetworkWithCacheFallback => stream::once(async move {
                inner
                    .fetch_with_fallback(&endpoint, &options, &key)
                    .await
                    .map(|(value, _)| value)
            })
            .boxed(),
            CachingStrategy::CacheUpdateRefresh => {
                let ctx = RefreshContext {
                    inner,
                    endpoint,
                    options,
                    key,
                };
                stream::unfold(RefreshStep::Cached(ctx), RefreshStep::advance).boxed()
            }
        }
    }

    /// GET resolving to the last value of [`WsApi::get_stream`].
    ///
    /// Concurrent calls for the same request share one underlying fetch; the
    /// fetch is dropped once every caller has gone away.
    pub async fn get_value(&self, endpoint: &str, options: RequestOptions) -> ApiResult<Option<Value>> {
        let flight_key = self.flight_key(endpoint, &options);
        // Declared before the shared future so it runs after that is dropped
        let _guard = FlightGuard {
            api: self,
            key: flight_key.clone(),
        };
        let shared = self.join_or_start(&flight_key, || last_value(self.get_stream(endpoint, options)));
        shared.await
    }

    /// Network-with-cache-fallback GET that also reports whether the value
    /// is live or came from the store. Not shared between callers.
    pub async fn get_with_origin(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ApiResult<Option<(Value, Origin)>> {
        let key = options.store_key(endpoint);
        if !options.refresh && self.inner.network.is_device_offline() {
            debug!("Offline, serving {} from cache", key);
            return Ok(self.inner.read_cache(&key).await.map(|v| (v, Origin::Cache)));
        }
        self.inner
            .fetch_with_fallback(endpoint, &options, &key)
            .await
            .map(Some)
    }

    /// Prefetch `endpoints` into the store so they can be served offline.
    /// Failures are logged and skipped; returns how many were stored.
    pub async fn warm_cache(&self, endpoints: &[&str]) -> usize {
        let fetches = endpoints.iter().map(|endpoint| async move {
            let options = RequestOptions::new().caching(CachingStrategy::NetworkWithCacheFallback);
            match self.get_value(endpoint, options).await {
                Ok(_) => {
                    debug!("Prefetched {}", endpoint);
                    true
                }
                Err(e) => {
                    warn!("Could not prefetch {}: {}", endpoint, e);
                    false
                }
            }
        });
        future::join_all(fetches)
            .await
            .into_iter()
            .filter(|stored| *stored)
            .count()
    }

    /// Typed GET. `None` means nothing was available (offline cache miss).
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Option<T>> {
        match self.get_value(endpoint, options).await? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse response: {}", e)).into()
            }),
            None => Ok(None),
        }
    }

    pub async fn post(&self, endpoint: &str, body: Value, options: RequestOptions) -> ApiResult<Value> {
        self.mutate(Method::POST, endpoint, Some(body), options).await
    }

    pub async fn put(&self, endpoint: &str, body: Value, options: RequestOptions) -> ApiResult<Value> {
        self.mutate(Method::PUT, endpoint, Some(body), options).await
    }

    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> ApiResult<Value> {
        self.mutate(Method::DELETE, endpoint, None, options).await
    }

    /// Mutating calls are neither cached nor retried
    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<Value> {
        if self.inner.network.is_device_offline() {
            return Err(ApiError::Offline);
        }
        self.inner
            .send_once(&method, endpoint, &options, body.as_ref())
            .await
    }

    /// Everything that shapes the request or where its result is stored
    fn flight_key(&self, endpoint: &str, options: &RequestOptions) -> String {
        let mut headers: Vec<_> = options.headers.iter().collect();
        headers.sort();
        format!(
            "{}{}|{}|{}|{}|{}|{:?}",
            self.inner.base_url(options),
            endpoint_key(endpoint, &options.params),
            options.store_key(endpoint),
            options.caching.unwrap_or(self.inner.settings.caching),
            options.refresh,
            options.auth,
            headers,
        )
    }

    fn join_or_start(
        &self,
        flight_key: &str,
        start: impl FnOnce() -> SharedGet,
    ) -> Shared<SharedGet> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(flight_key).and_then(WeakShared::upgrade) {
            debug!("Joining in-flight GET {}", flight_key);
            return existing;
        }

        let shared = start().shared();
        if let Some(weak) = shared.downgrade() {
            in_flight.insert(flight_key.to_string(), weak);
        }
        shared
    }

    fn forget_if_settled(&self, flight_key: &str) {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let settled = in_flight
            .get(flight_key)
            .map(|weak| weak.upgrade().is_none_or(|s| s.peek().is_some()))
            .unwrap_or(false);
        if settled {
            in_flight.remove(flight_key);
        }
    }
}

/// Removes a flight's table entry once it has settled or every caller is gone
struct FlightGuard<'a> {
    api: &'a WsApi,
    key: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.api.forget_if_settled(&self.key);
    }
}

/// Split a base URL into its path and any query pairs it carries
fn split_base(base: &str) -> (&str, Vec<(String, String)>) {
    match base.split_once('?') {
        Some((path, _)) => {
            let pairs = reqwest::Url::parse(base)
                .map(|url| url.query_pairs().into_owned().collect())
                .unwrap_or_default();
            (path, pairs)
        }
        None => (base, Vec::new()),
    }
}

/// Collapse a GET stream into its last value, or its first error
fn last_value(stream: BoxStream<'static, ApiResult<Value>>) -> SharedGet {
    stream
        .fold(Ok(None), |acc, item| {
            future::ready(match (acc, item) {
                (Err(e), _) => Err(e),
                (Ok(_), Ok(value)) => Ok(Some(value)),
                (Ok(_), Err(e)) => Err(e),
            })
        })
        .boxed()
}

impl Inner {
    fn base_url<'a>(&'a self, options: &'a RequestOptions) -> &'a str {
        options.url.as_deref().unwrap_or(&self.settings.api_url)
    }

    /// Cached value for `key`; store failures count as a miss
    async fn read_cache(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(Some(Value::Null)) | Ok(None) => None,
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, value: &Value) {
        if let Err(e) = self.store.set(key, value).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// One authenticated attempt: ticket first, then the HTTP call
    async fn send_once(
        &self,
        method: &Method,
        endpoint: &str,
        options: &RequestOptions,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let (base, mut query) = split_base(self.base_url(options));
        query.extend(options.params.iter().cloned());

        if options.auth {
            let ticket = self.tickets.get_service_ticket(base).await?;
            query.push(("ticket".to_string(), ticket));
        }

        let request = HttpRequest {
            method: method.clone(),
            url: format!("{}{}", base, endpoint),
            query,
            headers: options.headers.clone(),
            body: body.cloned(),
            timeout: options.timeout.unwrap_or(self.settings.request_timeout),
        };
        self.transport.send(request).await
    }

    /// GET with backoff on transient failures. Each attempt mints its own
    /// service ticket since tickets are single-use.
    async fn fetch_with_retry(&self, endpoint: &str, options: &RequestOptions) -> ApiResult<Value> {
        let policy = self.settings.retry;
        let mut attempt = 0;
        loop {
            match self.send_once(&Method::GET, endpoint, options, None).await {
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "GET {} failed ({}), retry {}/{} in {:?}",
                        endpoint, e, attempt, policy.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn fetch_with_fallback(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        key: &str,
    ) -> ApiResult<(Value, Origin)> {
        match self.fetch_with_retry(endpoint, options).await {
            Ok(value) => {
                self.write_cache(key, &value).await;
                Ok((value, Origin::Network))
            }
            Err(e) if e.is_transient() => match self.read_cache(key).await {
                Some(cached) => {
                    warn!("GET {} failed ({}), serving cached value", endpoint, e);
                    Ok((cached, Origin::Cache))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

struct RefreshContext {
    inner: Arc<Inner>,
    endpoint: String,
    options: RequestOptions,
    key: String,
}

/// States of a cache-update-refresh stream
enum RefreshStep {
    Cached(RefreshContext),
    Network {
        ctx: RefreshContext,
        had_cached: bool,
    },
    Done,
}

impl RefreshStep {
    async fn advance(self) -> Option<(ApiResult<Value>, RefreshStep)> {
        match self {
            RefreshStep::Cached(ctx) => {
                let cached = if ctx.options.refresh {
                    None
                } else {
                    ctx.inner.read_cache(&ctx.key).await
                };
                match cached {
                    Some(value) => Some((
                        Ok(value),
                        RefreshStep::Network {
                            ctx,
                            had_cached: true,
                        },
                    )),
                    None => Self::network(ctx, false).await,
                }
            }
            RefreshStep::Network { ctx, had_cached } => Self::network(ctx, had_cached).await,
            RefreshStep::Done => None,
        }
    }

    async fn network(
        ctx: RefreshContext,
        had_cached: bool,
    ) -> Option<(ApiResult<Value>, RefreshStep)> {
        match ctx.inner.fetch_with_retry(&ctx.endpoint, &ctx.options).await {
            Ok(value) => {
                ctx.inner.write_cache(&ctx.key, &value).await;
                Some((Ok(value), RefreshStep::Done))
            }
            // The cached value already emitted stands in for the refresh
            Err(e) if had_cached && e.is_transient() => {
                warn!("Refresh of {} failed ({}), keeping cached value", ctx.endpoint, e);
                None
            }
            Err(e) => Some((Err(e), RefreshStep::Done)),
        }
    }
}
