//! Key-value store used as the durable response cache and session store
//!
//! The request pipeline and ticket service only need `get`/`set`/`clear` by
//! string key. [`SqliteStore`] persists values across runs; [`MemoryStore`]
//! keeps everything in process.

pub mod key;
pub mod storage;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Fixed keys for session artifacts.
pub struct SessionKeys;

impl SessionKeys {
    pub const TGT: &'static str = "tgt";
    pub const CREDENTIALS: &'static str = "cred";
    pub const PRINCIPAL: &'static str = "principal";
    pub const TIMETABLE: &'static str = "timetable-cache";
}

/// Asynchronous get/set/clear by string key.
///
/// Writes replace any previous value for the key. No atomicity is promised
/// across a read followed by a write; concurrent writers race last-write-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store `value` under `key`, overwriting in place
    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Remove a single key. Returns whether something was removed.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key. Returns the number of entries dropped.
    async fn clear(&self) -> Result<usize, StoreError>;
}

/// Typed helpers on top of any [`KeyValueStore`]
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.set(key, &value).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// In-process store, lost when the process exits
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

// Re-export main types
pub use key::endpoint_key;
pub use storage::SqliteStore;
