//! APSpace web-service client
//!
//! - [`Transport`] - sends one HTTP request and classifies the response
//! - [`HttpTransport`] - reqwest implementation of [`Transport`]
//! - [`WsApi`] - request pipeline: tickets, retries, offline handling, caching

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::ApiResult;

pub mod http;
#[cfg(test)]
pub mod mock;
pub mod options;
pub mod pipeline;
pub mod retry;

pub use http::HttpTransport;
#[cfg(test)]
pub use mock::MockTransport;
pub use options::{CachingStrategy, RequestOptions};
pub use pipeline::{Origin, PipelineSettings, WsApi};
pub use retry::RetryPolicy;

/// A single outbound HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Value of a query parameter, if present
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Sends requests to the remote web services.
///
/// Implementations map responses onto the error taxonomy: 4xx become
/// `ApiError::Client` with the original status, 5xx and connectivity drops
/// become `ApiError::TransientServer`. Bodies that are not JSON come back as
/// `Value::String`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ApiResult<Value>;
}
