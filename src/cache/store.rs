//! SQLite-backed response store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// A response as held by the cache: status, media type and raw body.
///
/// Both real network responses and the synthesized offline fallbacks use this
/// shape, so the fetch interceptor can always hand back the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

/// Versioned key→response store.
///
/// Rows are keyed `(version, request_key)`; lookups only ever see the current
/// version. Older versions stay on disk until [`CacheStore::collect_garbage`]
/// runs during activation.
pub struct CacheStore {
  conn: Mutex<Connection>,
  version: String,
}

/// Store names are namespaced so several apps can share one database file.
fn store_version_name(version: &str) -> String {
  format!("pulsed-{version}")
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    version TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (version, request_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_version
    ON response_cache(version);
"#;

impl CacheStore {
  /// Open or create the store at the given path for one cache generation.
  pub fn open(path: &Path, version: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, version)
  }

  /// Open the store at the default location (platform data directory).
  pub fn open_default(version: &str) -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Self::open(&data_dir.join("pulsed").join("cache.db"), version)
  }

  /// In-memory store, dropped when closed. Used in tests and dry runs.
  pub fn open_in_memory(version: &str) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;

    Self::with_connection(conn, version)
  }

  fn with_connection(conn: Connection, version: &str) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
      version: store_version_name(version),
    };
    store.run_migrations()?;
    Ok(store)
  }

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

  /// Full name of the current cache generation (e.g. "pulsed-v1").
  pub fn store_name(&self) -> &str {
    &self.version
  }

  /// Exact-match lookup within the current generation. No freshness check.
  pub fn match_request(&self, request_key: &str) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, content_type, body FROM response_cache
         WHERE version = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare cache lookup: {}", e))?;

    let row = stmt
      .query_row(params![self.version, request_key], |row| {
        Ok(StoredResponse {
          status: row.get(0)?,
          content_type: row.get(1)?,
          body: row.get(2)?,
        })
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", request_key, e))?;

    Ok(row)
  }

  /// Store a response under the current generation, replacing any prior entry
  /// for the same key.
  pub fn put(&self, request_key: &str, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (version, request_key, status, content_type, body, stored_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![
          self.version,
          request_key,
          response.status,
          response.content_type,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", request_key, e))?;

    Ok(())
  }

  /// All generations present in the database, current or not.
  pub fn versions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT version FROM response_cache ORDER BY version")
      .map_err(|e| eyre!("Failed to prepare version listing: {}", e))?;

    let versions = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list versions: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read version row: {}", e))?;

    Ok(versions)
  }

  /// Delete every entry not belonging to the current generation.
  ///
  /// Returns the number of rows removed.
  pub fn collect_garbage(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE version != ?",
        params![self.version],
      )
      .map_err(|e| eyre!("Failed to collect stale cache versions: {}", e))?;

    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn html(body: &str) -> StoredResponse {
    StoredResponse {
      status: 200,
      content_type: Some("text/html".to_string()),
      body: body.as_bytes().to_vec(),
    }
  }

  #[test]
  fn put_then_match_round_trips() {
    let store = CacheStore::open_in_memory("v1").unwrap();

    store.put("/", &html("<html>home</html>")).unwrap();

    let hit = store.match_request("/").unwrap().unwrap();
    assert_eq!(hit.status, 200);
    assert_eq!(hit.body, b"<html>home</html>");
  }

  #[test]
  fn match_misses_for_unknown_key() {
    let store = CacheStore::open_in_memory("v1").unwrap();

    assert!(store.match_request("/nope").unwrap().is_none());
  }

  #[test]
  fn put_overwrites_existing_entry() {
    let store = CacheStore::open_in_memory("v1").unwrap();

    store.put("/", &html("old")).unwrap();
    store.put("/", &html("new")).unwrap();

    let hit = store.match_request("/").unwrap().unwrap();
    assert_eq!(hit.body, b"new");
  }

  #[test]
  fn garbage_collection_drops_every_stale_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    // Two old generations
    let v1 = CacheStore::open(&path, "v1").unwrap();
    v1.put("/", &html("one")).unwrap();
    drop(v1);
    let v2 = CacheStore::open(&path, "v2").unwrap();
    v2.put("/", &html("two")).unwrap();
    drop(v2);

    // New generation activates and collects
    let v3 = CacheStore::open(&path, "v3").unwrap();
    v3.put("/", &html("three")).unwrap();
    let removed = v3.collect_garbage().unwrap();

    assert_eq!(removed, 2);
    assert_eq!(v3.versions().unwrap(), vec!["pulsed-v3".to_string()]);
    assert_eq!(v3.match_request("/").unwrap().unwrap().body, b"three");
  }

  #[test]
  fn lookups_are_scoped_to_the_current_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let v1 = CacheStore::open(&path, "v1").unwrap();
    v1.put("/only-in-v1", &html("x")).unwrap();
    drop(v1);

    let v2 = CacheStore::open(&path, "v2").unwrap();
    assert!(v2.match_request("/only-in-v1").unwrap().is_none());
  }
}
