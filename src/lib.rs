//! APSpace access layer
//!
//! Authenticated, cached and retrying access to the APSpace web services:
//! - [`cas`] - CAS ticket cascade and session login
//! - [`client`] - request pipeline with caching strategies and backoff
//! - [`network`] - connectivity monitor
//! - [`cache`] - key-value store for responses and session artifacts

pub mod cache;
pub mod cas;
pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod timetable;

#[cfg(test)]
mod testing;

pub use error::{ApiError, Error, Result};
