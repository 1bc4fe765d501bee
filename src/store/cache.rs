use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Fixed keys partitioning the persisted cache. Each store writes only its
/// own key, so stores never coordinate their persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Users,
    CurrentUserId,
    Boards,
    Notifications,
    Token,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "kb-users",
            Self::CurrentUserId => "kb-currentUserId",
            Self::Boards => "kb-boards",
            Self::Notifications => "kb-notifications",
            Self::Token => "kb-token",
        }
    }
}

/// Durable key-value substrate holding serialized snapshots.
pub trait PersistedCache: Send + Sync {
    fn get(&self, key: CacheKey) -> Result<Option<String>>;
    fn set(&self, key: CacheKey, value: &str) -> Result<()>;
    fn remove(&self, key: CacheKey) -> Result<()>;
}

/// Reads and decodes a snapshot. Missing, unreadable and malformed entries
/// all come back as `None`.
pub fn read_snapshot<T: DeserializeOwned>(cache: &dyn PersistedCache, key: CacheKey) -> Option<T> {
    let raw = match cache.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key = key.as_str(), error = %e, "cache read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = key.as_str(), error = %e, "discarding malformed cache entry");
            None
        }
    }
}

/// Serializes and writes a snapshot, logging instead of failing.
pub fn write_snapshot<T: Serialize + ?Sized>(cache: &dyn PersistedCache, key: CacheKey, value: &T) {
    let result = serde_json::to_string(value)
        .context("Failed to serialize snapshot")
        .and_then(|raw| cache.set(key, &raw));
    if let Err(e) = result {
        tracing::warn!(key = key.as_str(), error = %e, "cache write failed");
    }
}

/// SQLite-backed cache that survives process restarts.
///
/// Calls run synchronously on the caller's thread, async tasks included.
/// Every access is a single-row lookup or upsert on a local file, short
/// enough that the stores call it inline instead of through
/// `spawn_blocking`.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the cache database at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite cache")?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Create an in-memory SQLite cache (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite cache")?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS cache_entries (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );",
            )
            .context("Failed to create cache_entries table")?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache lock poisoned: {}", e))
    }
}

impl PersistedCache for SqliteCache {
    fn get(&self, key: CacheKey) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT value FROM cache_entries WHERE key = ?1")
            .context("Failed to prepare cache read")?;
        let mut rows = stmt
            .query_map(params![key.as_str()], |row| row.get::<_, String>(0))
            .context("Failed to query cache entry")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read cache entry")?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: CacheKey, value: &str) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO cache_entries (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key.as_str(), value],
            )
            .context("Failed to upsert cache entry")?;
        Ok(())
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        self.lock()?
            .execute(
                "DELETE FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
            )
            .context("Failed to delete cache entry")?;
        Ok(())
    }
}

/// Process-local cache. Counts writes so tests can tell "persisted the same
/// value" apart from "did not persist".
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, String>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<CacheKey, String>>> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache lock poisoned: {}", e))
    }
}

impl PersistedCache for MemoryCache {
    fn get(&self, key: CacheKey) -> Result<Option<String>> {
        Ok(self.entries()?.get(&key).cloned())
    }

    fn set(&self, key: CacheKey, value: &str) -> Result<()> {
        self.entries()?.insert(key, value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        self.entries()?.remove(&key);
        Ok(())
    }
}
