//! Mock transport for testing
//!
//! Replays scripted responses in order, then a fallback response, and keeps
//! every request it saw together with the (tokio) time it arrived.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{HttpRequest, Transport};
use crate::error::{ApiError, ApiResult};
use crate::testing::CallLog;

/// Mock transport.
///
/// # Example
/// ```ignore
/// let transport = MockTransport::new()
///     .then(Err(ApiError::TransientServer("502".into())))
///     .respond_with(json!({"ok": true}));
/// ```
pub struct MockTransport {
    scripted: Mutex<VecDeque<ApiResult<Value>>>,
    fallback: ApiResult<Value>,
    seen: Mutex<Vec<(Instant, HttpRequest)>>,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: Ok(Value::Null),
            seen: Mutex::new(Vec::new()),
            delay: None,
            log: None,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with `value`
    pub fn respond_with(mut self, value: Value) -> Self {
        self.fallback = Ok(value);
        self
    }

    /// Fail every unscripted request with `error`
    pub fn fail_with(mut self, error: ApiError) -> Self {
        self.fallback = Err(error);
        self
    }

    /// Queue a one-off result, consumed before the fallback
    pub fn then(self, result: ApiResult<Value>) -> Self {
        self.scripted.lock().unwrap().push_back(result);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Record calls into a journal shared with other mocks
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Arrival time of each request
    pub fn arrivals(&self) -> Vec<Instant> {
        self.seen.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> ApiResult<Value> {
        if let Some(log) = &self.log {
            let ticket = request.query_param("ticket").unwrap_or("-");
            log.record(format!("http:{}:{}", request.method, ticket));
        }
        self.seen
            .lock()
            .unwrap()
            .push((Instant::now(), request));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}
