//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CachedSnapshot, Partition, PartitionInfo, Purpose, RequestKey, Snapshot};

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Create the partition if missing. Idempotent.
  fn open_partition(&self, name: &str, purpose: Purpose) -> Result<Partition>;

  /// All partitions in creation order.
  fn partitions(&self) -> Result<Vec<PartitionInfo>>;

  /// Drop a partition and everything in it. Returns false if it did not exist.
  fn delete_partition(&self, name: &str) -> Result<bool>;

  /// Store (or replace) the snapshot for `key`. Non-2xx snapshots are refused.
  fn put(&self, partition: &Partition, key: &RequestKey, snapshot: &Snapshot) -> Result<()>;

  /// Exact lookup in one partition.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedSnapshot>>;

  /// Lookup across every partition, oldest partition first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedSnapshot>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn open_partition(&self, name: &str, purpose: Purpose) -> Result<Partition> {
    Ok(Partition {
      name: name.to_string(),
      purpose,
    })
  }

  fn partitions(&self) -> Result<Vec<PartitionInfo>> {
    Ok(Vec::new())
  }

  fn delete_partition(&self, _name: &str) -> Result<bool> {
    Ok(false)
  }

  fn put(&self, _partition: &Partition, _key: &RequestKey, _snapshot: &Snapshot) -> Result<()> {
    Ok(()) // Discard
  }

  fn get(&self, _partition: &str, _key: &RequestKey) -> Result<Option<CachedSnapshot>> {
    Ok(None) // Always miss
  }

  fn match_any(&self, _key: &RequestKey) -> Result<Option<CachedSnapshot>> {
    Ok(None) // Always miss
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Database that lives only as long as the store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named partitions; the name carries the version suffix
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    purpose TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity hash
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_hash),
    FOREIGN KEY (partition) REFERENCES partitions(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(request_hash);
"#;

impl CacheStore for SqliteStore {
  fn open_partition(&self, name: &str, purpose: Purpose) -> Result<Partition> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name, purpose) VALUES (?, ?)",
        params![name, purpose.as_str()],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", name, e))?;

    Ok(Partition {
      name: name.to_string(),
      purpose,
    })
  }

  fn partitions(&self) -> Result<Vec<PartitionInfo>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT p.name, p.purpose, p.created_at,
                (SELECT COUNT(*) FROM entries e WHERE e.partition = p.name)
         FROM partitions p
         ORDER BY p.created_at, p.rowid",
      )
      .map_err(|e| eyre!("Failed to prepare partition query: {}", e))?;

    let rows: Vec<(String, String, String, i64)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    rows
      .into_iter()
      .map(|(name, purpose, created_at, entries)| {
        Ok(PartitionInfo {
          purpose: Purpose::parse(&purpose)
            .ok_or_else(|| eyre!("Unknown purpose '{}' for partition {}", purpose, name))?,
          name,
          entries: entries as usize,
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect()
  }

  fn delete_partition(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Explicit delete keeps this correct even if foreign keys are off
    conn
      .execute("DELETE FROM entries WHERE partition = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = conn
      .execute("DELETE FROM partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;

    Ok(removed > 0)
  }

  fn put(&self, partition: &Partition, key: &RequestKey, snapshot: &Snapshot) -> Result<()> {
    if !snapshot.is_success() {
      return Err(eyre!(
        "Refusing to cache {} {} with status {}",
        key.method,
        key.url,
        snapshot.status
      ));
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let headers = serde_json::to_string(&snapshot.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name, purpose) VALUES (?, ?)",
        params![partition.name, partition.purpose.as_str()],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", partition.name, e))?;

    // Last write wins; the previous snapshot is replaced wholesale
    conn
      .execute(
        "INSERT OR REPLACE INTO entries
           (partition, request_hash, method, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          partition.name,
          key.cache_hash(),
          key.method,
          key.url,
          snapshot.status,
          headers,
          snapshot.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key.url, e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        "SELECT partition, status, headers, body, stored_at FROM entries
         WHERE partition = ? AND request_hash = ?",
        params![partition, key.cache_hash()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query {}: {}", key.url, e))?;

    row.map(into_cached).transpose()
  }

  /// Oldest partition wins, so installed copies shadow later dynamic ones.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        "SELECT e.partition, e.status, e.headers, e.body, e.stored_at FROM entries e
         INNER JOIN partitions p ON p.name = e.partition
         WHERE e.request_hash = ?
         ORDER BY p.created_at, p.rowid
         LIMIT 1",
        params![key.cache_hash()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query {}: {}", key.url, e))?;

    row.map(into_cached).transpose()
  }
}

type EntryRow = (String, u16, String, Vec<u8>, String);

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
  ))
}

fn into_cached((partition, status, headers, body, stored_at): EntryRow) -> Result<CachedSnapshot> {
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  Ok(CachedSnapshot {
    partition,
    snapshot: Snapshot {
      status,
      headers,
      body,
    },
    stored_at: parse_datetime(&stored_at)?,
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
