//! Per-request options and caching strategies

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::endpoint_key;

/// How a GET consults and updates the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachingStrategy {
    /// Live network round trip only; the cache is neither read nor written
    CacheOnly,
    /// Network first, cached value when the network fails
    #[default]
    NetworkWithCacheFallback,
    /// Cached value immediately, then the network value
    CacheUpdateRefresh,
}

impl CachingStrategy {
    pub const ALL: [CachingStrategy; 3] = [
        CachingStrategy::CacheOnly,
        CachingStrategy::NetworkWithCacheFallback,
        CachingStrategy::CacheUpdateRefresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CachingStrategy::CacheOnly => "cache-only",
            CachingStrategy::NetworkWithCacheFallback => "network-with-cache-fallback",
            CachingStrategy::CacheUpdateRefresh => "cache-update-refresh",
        }
    }
}

impl fmt::Display for CachingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CachingStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = CachingStrategy::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown caching strategy '{}' (expected {})", s, names.join(", "))
            })
    }
}

/// Options for one pipeline call
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Caching strategy; the pipeline default applies when unset
    pub caching: Option<CachingStrategy>,
    /// Skip the immediate cache shortcuts and go to the network
    pub refresh: bool,
    /// Attach a service ticket
    pub auth: bool,
    /// Base URL override (the pipeline's API URL otherwise)
    pub url: Option<String>,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Per-attempt timeout; the pipeline default applies when unset
    pub timeout: Option<Duration>,
    /// Store key override; defaults to endpoint plus query
    pub cache_key: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            caching: None,
            refresh: false,
            auth: true,
            url: None,
            params: Vec::new(),
            headers: Vec::new(),
            timeout: None,
            cache_key: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caching(mut self, strategy: CachingStrategy) -> Self {
        self.caching = Some(strategy);
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Send without a service ticket
    pub fn unauthenticated(mut self) -> Self {
        self.auth = false;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Store key this request reads and writes
    pub fn store_key(&self, endpoint: &str) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| endpoint_key(endpoint, &self.params))
    }
}
