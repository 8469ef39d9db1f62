//! Mock ticket-granting protocol for testing
//!
//! Hands out sequential `TGT-n` / `ST-n` tickets and records every call so
//! tests can assert on the cascade.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Credentials, TicketApi};
use crate::error::{ApiError, ApiResult};
use crate::session::{Principal, Role, RoleSet};
use crate::testing::CallLog;

#[derive(Default)]
struct MockState {
    tgt_counter: usize,
    st_counter: usize,
    tgt_requests: usize,
    st_requests: Vec<(String, String)>,
    destroyed: Vec<String>,
}

/// Mock ticket API.
///
/// # Example
/// ```ignore
/// let api = MockTicketApi::new().with_rejected_tgt("TGT-stale");
/// let service = TicketService::new(Arc::new(api), store, Session::new(), CAS);
/// ```
pub struct MockTicketApi {
    state: Arc<Mutex<MockState>>,
    rejected_tgts: HashSet<String>,
    reject_all_tgts: bool,
    tgt_error: Option<ApiError>,
    st_error: Option<ApiError>,
    roles: Vec<Role>,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl Default for MockTicketApi {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            rejected_tgts: HashSet::new(),
            reject_all_tgts: false,
            tgt_error: None,
            st_error: None,
            roles: vec![Role::Student],
            delay: None,
            log: None,
        }
    }
}

impl MockTicketApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject service ticket requests made with this TGT
    pub fn with_rejected_tgt(mut self, tgt: &str) -> Self {
        self.rejected_tgts.insert(tgt.to_string());
        self
    }

    /// Reject every service ticket request as if the TGT expired
    pub fn rejecting_all_tgts(mut self) -> Self {
        self.reject_all_tgts = true;
        self
    }

    /// Fail every credential exchange with `error`
    pub fn with_tgt_error(mut self, error: ApiError) -> Self {
        self.tgt_error = Some(error);
        self
    }

    /// Fail every service ticket request with `error`
    pub fn with_st_error(mut self, error: ApiError) -> Self {
        self.st_error = Some(error);
        self
    }

    /// Roles reported on validation; empty means unauthorized
    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Record calls into a journal shared with other mocks
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub async fn tgt_requests(&self) -> usize {
        self.state.lock().await.tgt_requests
    }

    /// (tgt, service) pairs in request order
    pub async fn st_requests(&self) -> Vec<(String, String)> {
        self.state.lock().await.st_requests.clone()
    }

    pub async fn destroyed(&self) -> Vec<String> {
        self.state.lock().await.destroyed.clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TicketApi for MockTicketApi {
    async fn request_tgt(&self, _credentials: &Credentials) -> ApiResult<String> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.tgt_requests += 1;
        if let Some(log) = &self.log {
            log.record("tgt");
        }

        if let Some(err) = &self.tgt_error {
            return Err(err.clone());
        }
        state.tgt_counter += 1;
        Ok(format!("TGT-{}", state.tgt_counter))
    }

    async fn request_st(&self, tgt: &str, service: &str) -> ApiResult<String> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state
            .st_requests
            .push((tgt.to_string(), service.to_string()));

        if let Some(err) = &self.st_error {
            return Err(err.clone());
        }
        if self.reject_all_tgts || self.rejected_tgts.contains(tgt) {
            return Err(ApiError::AuthenticationFailure {
                password_must_change: false,
            });
        }

        state.st_counter += 1;
        let st = format!("ST-{}", state.st_counter);
        if let Some(log) = &self.log {
            log.record(format!("st:{}", st));
        }
        Ok(st)
    }

    async fn validate(&self, _st: &str, _service: &str) -> ApiResult<Principal> {
        self.pause().await;
        if self.roles.is_empty() {
            return Err(ApiError::AuthorizationFailure);
        }
        Ok(Principal {
            username: "tp012345".to_string(),
            roles: self.roles.iter().copied().collect::<RoleSet>(),
            attributes: Value::Null,
        })
    }

    async fn destroy_tgt(&self, tgt: &str) -> ApiResult<()> {
        self.state.lock().await.destroyed.push(tgt.to_string());
        Ok(())
    }
}
