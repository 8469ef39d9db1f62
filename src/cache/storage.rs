//! SQLite-backed key-value store with file blob support
//!
//! Stores small values inline in SQLite, large values (>10KB) as files.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::KeyValueStore;
use super::key::blob_name;
use crate::error::StoreError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Values larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

type Result<T> = std::result::Result<T, StoreError>;

/// SQLite-backed store with file blob support.
///
/// The connection lives behind a mutex and every operation runs on the
/// blocking pool, so the store can be shared across tasks.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    blobs_dir: PathBuf,
    root: PathBuf,
}

impl SqliteStore {
    /// Open or create the store at the default XDG cache location
    pub fn open() -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Get the store directory path (~/.cache/apspace on Linux/macOS)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(StoreError::NoHome)?;
        Ok(cache_base.join("apspace"))
    }

    /// Open the store at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("store.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Store schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY NOT NULL,
                data TEXT,
                blob_path TEXT,
                updated_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                blobs_dir,
                root: cache_dir.to_path_buf(),
            }),
        })
    }

    /// Directory this store was opened at
    pub fn path(&self) -> &Path {
        &self.inner.root
    }

    /// Get store statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        self.blocking(|inner| inner.stats()).await
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Nuke the store (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove store DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| StoreError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

impl Inner {
    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Task("store connection poisoned".to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let result: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT data, blob_path FROM kv_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let raw = match result {
            Some((Some(data), None)) => data.into_bytes(),
            Some((None, Some(blob_path))) => {
                let full_path = self.blobs_dir.join(&blob_path);
                match std::fs::read(&full_path) {
                    Ok(data) => data,
                    Err(e) => {
                        log::warn!("Failed to read blob {}: {}", blob_path, e);
                        // Delete stale entry
                        let _ = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key]);
                        return Ok(None);
                    }
                }
            }
            _ => return Ok(None),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let data =
            serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let now = Utc::now().timestamp();
        let conn = self.conn()?;

        // A previous blob for this key would otherwise be orphaned
        let old_blob: Option<Option<String>> = conn
            .query_row(
                "SELECT blob_path FROM kv_entries WHERE key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;

        if data.len() <= INLINE_THRESHOLD {
            conn.execute(
                "INSERT OR REPLACE INTO kv_entries (key, data, blob_path, updated_at, size_bytes)
                 VALUES (?1, ?2, NULL, ?3, ?4)",
                params![key, data, now, data.len()],
            )?;
            if let Some(Some(blob_path)) = old_blob {
                let _ = std::fs::remove_file(self.blobs_dir.join(blob_path));
            }
        } else {
            let blob_path = self.write_blob(key, data.as_bytes())?;
            conn.execute(
                "INSERT OR REPLACE INTO kv_entries (key, data, blob_path, updated_at, size_bytes)
                 VALUES (?1, NULL, ?2, ?3, ?4)",
                params![key, blob_path, now, data.len()],
            )?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let blob: Option<Option<String>> = conn
            .query_row(
                "SELECT blob_path FROM kv_entries WHERE key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(Some(blob_path)) = &blob {
            let _ = std::fs::remove_file(self.blobs_dir.join(blob_path));
        }
        let deleted = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |r| r.get(0))?;

        conn.execute("DELETE FROM kv_entries", [])?;

        if self.blobs_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.blobs_dir) {
                log::warn!("Failed to clear blobs directory: {}", e);
            }
            std::fs::create_dir_all(&self.blobs_dir)
                .map_err(|e| StoreError::Io(format!("Failed to recreate blobs dir: {}", e)))?;
        }

        Ok(count as usize)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |r| r.get(0))?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM kv_entries",
            [],
            |r| r.get(0),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(updated_at), MAX(updated_at) FROM kv_entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(StoreStats {
            total_entries: total_entries as usize,
            total_size_bytes: total_size as usize,
            oldest_entry: oldest,
            newest_entry: newest,
        })
    }

    /// Write a blob file, sharded by first 2 chars of the hashed key
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<String> {
        let name = blob_name(key);
        let shard = &name[..2];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}.json", name);
        let rel_path = format!("{}/{}", shard, filename);

        std::fs::write(shard_dir.join(&filename), data)
            .map_err(|e| StoreError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.blocking(move |inner| inner.get(&key)).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let key = key.to_string();
        let value = value.clone();
        self.blocking(move |inner| inner.set(&key, &value)).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |inner| inner.remove(&key)).await
    }

    async fn clear(&self) -> Result<usize> {
        self.blocking(|inner| inner.clear()).await
    }
}

/// Statistics about store state
#[derive(Debug)]
pub struct StoreStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open_at(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_set_get_inline() {
        let (store, _dir) = test_store();
        let value = json!({"STUDENT_NAME": "Lim", "INTAKE": "UC2F2208SE"});

        store.set("/student/profile", &value).await.unwrap();

        assert_eq!(store.get("/student/profile").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_set_get_blob() {
        let (store, dir) = test_store();
        let value = json!({"payload": "x".repeat(20_000)}); // 20KB - will use blob

        store.set("/big", &value).await.unwrap();

        assert_eq!(store.get("/big").await.unwrap(), Some(value));
        let name = blob_name("/big");
        assert!(
            dir.path()
                .join("blobs")
                .join(&name[..2])
                .join(format!("{}.json", name))
                .exists()
        );
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_entry() {
        let (store, _dir) = test_store();

        store.set("/x", &json!([1])).await.unwrap();
        store.set("/x", &json!([2])).await.unwrap();

        assert_eq!(store.get("/x").await.unwrap(), Some(json!([2])));
        assert_eq!(store.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_blob_replaced_by_inline_value() {
        let (store, _dir) = test_store();

        store
            .set("/x", &json!({"payload": "y".repeat(20_000)}))
            .await
            .unwrap();
        store.set("/x", &json!("small")).await.unwrap();

        assert_eq!(store.get("/x").await.unwrap(), Some(json!("small")));
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _dir) = test_store();
        store.set("tgt", &json!("TGT-1-abc")).await.unwrap();

        assert!(store.remove("tgt").await.unwrap());
        assert!(store.get("tgt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, _dir) = test_store();

        store.set("k1", &json!("d1")).await.unwrap();
        store.set("k2", &json!("d2")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.get("k1").await.unwrap().is_none());
        assert!(store.get("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteStore::open_at(dir.path()).unwrap();
            store.set("tgt", &json!("TGT-7")).await.unwrap();
        }
        let store = SqliteStore::open_at(dir.path()).unwrap();
        assert_eq!(store.get("tgt").await.unwrap(), Some(json!("TGT-7")));
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _dir) = test_store();

        store.set("k1", &json!("data1")).await.unwrap();
        store.set("k2", &json!("data2")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert!(stats.total_size_bytes > 0);
        assert!(stats.oldest_entry.is_some());
    }
}
