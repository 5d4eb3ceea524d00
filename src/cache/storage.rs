//! Storage for cached HTTP responses, grouped by versioned cache name.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::Database;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub url: String,
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

/// SQLite-backed response store. Rows live in named caches so a version bump
/// can drop a whole generation at activation time.
#[derive(Clone)]
pub struct ResponseStore {
  db: Arc<Database>,
}

impl ResponseStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Store (or replace) the response for a URL in the given cache.
  pub fn put(
    &self,
    cache_name: &str,
    url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
  ) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO response_cache
           (cache_name, url_hash, url, status, content_type, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![cache_name, url_hash(url), url, status, content_type, body],
      )
      .map_err(|e| eyre!("Failed to cache response for {}: {}", url, e))?;

    Ok(())
  }

  /// Look up the cached response for a URL in the given cache.
  pub fn get(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, content_type, body, cached_at
         FROM response_cache WHERE cache_name = ? AND url_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare cache lookup: {}", e))?;

    let row: Option<(String, u16, Option<String>, Vec<u8>, String)> = stmt
      .query_row(params![cache_name, url_hash(url)], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some((url, status, content_type, body, cached_at_str)) => {
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse {
          url,
          status,
          content_type,
          body,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  /// Delete every cache whose name is not in `current`. Returns the number of
  /// rows removed.
  pub fn prune_stale_caches(&self, current: &[&str]) -> Result<usize> {
    let conn = self.db.lock()?;

    let names = self.cache_names_locked(&conn)?;
    let mut removed = 0;

    for name in names {
      if !current.contains(&name.as_str()) {
        removed += conn
          .execute(
            "DELETE FROM response_cache WHERE cache_name = ?",
            params![name],
          )
          .map_err(|e| eyre!("Failed to prune cache '{}': {}", name, e))?;
      }
    }

    Ok(removed)
  }

  /// Distinct cache names currently present.
  pub fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;
    self.cache_names_locked(&conn)
  }

  fn cache_names_locked(&self, conn: &rusqlite::Connection) -> Result<Vec<String>> {
    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM response_cache ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare cache-name query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query cache names: {}", e))?
      .collect::<std::result::Result<Vec<String>, _>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }
}

/// SHA256 hash for stable, fixed-length keys.
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
