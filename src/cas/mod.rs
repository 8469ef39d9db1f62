//! Central Authentication Service (CAS) ticket handling
//!
//! The cascade is credentials → ticket-granting ticket (TGT) → service ticket
//! (ST) → validated principal:
//! - [`TicketApi`] - the remote ticket-granting protocol
//! - [`CasClient`] - reqwest implementation of [`TicketApi`]
//! - [`TicketService`] - caches the TGT and mints service tickets on demand

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::session::Principal;

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod service;

pub use client::CasClient;
#[cfg(test)]
pub use mock::MockTicketApi;
pub use service::TicketService;

/// Login credentials exchanged for a ticket-granting ticket
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote ticket-granting protocol
#[async_trait]
pub trait TicketApi: Send + Sync {
    /// Exchange credentials for a ticket-granting ticket
    async fn request_tgt(&self, credentials: &Credentials) -> ApiResult<String>;

    /// Mint a single-use service ticket for `service` from a TGT
    async fn request_st(&self, tgt: &str, service: &str) -> ApiResult<String>;

    /// Validate a service ticket and resolve the principal behind it
    async fn validate(&self, st: &str, service: &str) -> ApiResult<Principal>;

    /// Invalidate a TGT on the server
    async fn destroy_tgt(&self, tgt: &str) -> ApiResult<()>;
}
