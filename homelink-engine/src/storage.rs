//! Durable Local Store
//!
//! Key-value persistence surviving process restarts. The engine assumes
//! crash-safety at the granularity of a single key write and nothing more;
//! the ledger, unlock registry and history each serialize their whole state
//! under one key.
//!
//! Two implementations ship with the engine:
//!
//! - [`SqliteStore`] — the production backend, one `kv` table in a SQLite
//!   database under the platform data directory.
//! - [`MemoryStore`] — ephemeral HashMap backend with failure injection,
//!   used by tests and by the agent when no data directory is configured.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::model::current_timestamp;

/// Key-value persistence seam consumed by the engine
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn multi_get(&self, keys: &[&str]) -> Result<HashMap<String, String>>;
}

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at the default platform path
    pub fn new() -> Result<Self> {
        Self::open(&Self::default_path()?)
    }

    /// Open (or create) the store at an explicit path (used by tests)
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| {
            EngineError::Configuration("could not determine local data directory".to_string())
        })?;
        Ok(data_dir.join("homelink").join("engine.db"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        debug!("key-value store schema initialized");
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EngineError::Storage(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
            params![key, value, current_timestamp()],
        )?;
        Ok(())
    }

    async fn multi_get(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let conn = self.lock_conn()?;
        let mut out = HashMap::with_capacity(keys.len());
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        for key in keys {
            let value: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(value) = value {
                out.insert((*key).to_string(), value);
            }
        }
        Ok(out)
    }
}

/// In-memory store with failure injection for tests
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get`/`multi_get` fail with a storage error
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set` fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("injected read failure".to_string()));
        }
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("injected write failure".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn multi_get(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("injected read failure".to_string()));
        }
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }
}
