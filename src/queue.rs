//! Durable queue of deferred mutations.
//!
//! Every mutating request that cannot reach the API right away lands here and
//! survives process restarts. The sync engine drains the queue oldest-first;
//! an item only leaves the queue when the server acknowledges it (or on an
//! explicit reset).

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;

use crate::db::Database;

/// Lifecycle state of a freshly enqueued item.
pub const STATUS_PENDING: &str = "pending";
/// Items a bounded retry policy gave up on. Kept for inspection, never replayed.
pub const STATUS_DEAD: &str = "dead";

/// A stored deferred mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
  pub id: i64,
  pub url: String,
  pub method: String,
  pub body: serde_json::Value,
  pub item_type: String,
  pub headers: Option<serde_json::Value>,
  /// Creation time in epoch millis; defines replay order
  pub timestamp: i64,
  pub status: String,
  pub attempts: i64,
}

/// What callers hand to [`OfflineQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub url: String,
  /// HTTP verb; defaults to POST when not set
  pub method: Option<String>,
  pub body: serde_json::Value,
  pub item_type: String,
  pub headers: Option<serde_json::Value>,
}

/// Durable FIFO of deferred mutations.
#[derive(Clone)]
pub struct OfflineQueue {
  db: Arc<Database>,
}

impl OfflineQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Store a request for later replay. The write is a single atomic insert;
  /// either the full item is stored or nothing is.
  pub fn enqueue(&self, request: QueuedRequest) -> Result<QueueItem> {
    let conn = self.db.lock()?;

    let method = request.method.unwrap_or_else(|| "POST".to_string());
    let body = serde_json::to_vec(&request.body)
      .map_err(|e| eyre!("Failed to serialize request body: {}", e))?;
    let headers = match &request.headers {
      Some(h) => {
        Some(serde_json::to_vec(h).map_err(|e| eyre!("Failed to serialize headers: {}", e))?)
      }
      None => None,
    };
    let timestamp = Utc::now().timestamp_millis();

    conn
      .execute(
        "INSERT INTO offline_queue (url, method, body, item_type, headers, timestamp, status, attempts)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
        params![
          request.url,
          method,
          body,
          request.item_type,
          headers,
          timestamp,
          STATUS_PENDING
        ],
      )
      .map_err(|e| eyre!("Failed to enqueue request: {}", e))?;

    let id = conn.last_insert_rowid();

    Ok(QueueItem {
      id,
      url: request.url,
      method,
      body: request.body,
      item_type: request.item_type,
      headers: request.headers,
      timestamp,
      status: STATUS_PENDING.to_string(),
      attempts: 0,
    })
  }

  /// Remove the item with the given id. Removing an absent id is a no-op.
  pub fn dequeue(&self, id: i64) -> Result<()> {
    self
      .db
      .lock()?
      .execute("DELETE FROM offline_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to dequeue item {}: {}", id, e))?;
    Ok(())
  }

  /// All pending items in replay order (timestamp ascending, id as tiebreak).
  pub fn list_pending(&self) -> Result<Vec<QueueItem>> {
    self.list_by_status(STATUS_PENDING)
  }

  /// Items a bounded retry policy abandoned.
  pub fn list_dead(&self) -> Result<Vec<QueueItem>> {
    self.list_by_status(STATUS_DEAD)
  }

  fn list_by_status(&self, status: &str) -> Result<Vec<QueueItem>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, body, item_type, headers, timestamp, status, attempts
         FROM offline_queue WHERE status = ?
         ORDER BY timestamp ASC, id ASC",
      )
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let items = stmt
      .query_map(params![status], |row| {
        let body: Vec<u8> = row.get(3)?;
        let headers: Option<Vec<u8>> = row.get(5)?;
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          body,
          row.get::<_, String>(4)?,
          headers,
          row.get::<_, i64>(6)?,
          row.get::<_, String>(7)?,
          row.get::<_, i64>(8)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query queue: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read queue row: {}", e))?;

    items
      .into_iter()
      .map(
        |(id, url, method, body, item_type, headers, timestamp, status, attempts)| {
          let body = serde_json::from_slice(&body)
            .map_err(|e| eyre!("Failed to deserialize body of item {}: {}", id, e))?;
          let headers = match headers {
            Some(h) => Some(
              serde_json::from_slice(&h)
                .map_err(|e| eyre!("Failed to deserialize headers of item {}: {}", id, e))?,
            ),
            None => None,
          };
          Ok(QueueItem {
            id,
            url,
            method,
            body,
            item_type,
            headers,
            timestamp,
            status,
            attempts,
          })
        },
      )
      .collect()
  }

  /// Remove all items unconditionally. Explicit resets only; the sync flow
  /// never calls this.
  pub fn clear(&self) -> Result<()> {
    self
      .db
      .lock()?
      .execute("DELETE FROM offline_queue", [])
      .map_err(|e| eyre!("Failed to clear queue: {}", e))?;
    Ok(())
  }

  /// Record a failed replay attempt and return the new attempt count.
  pub fn record_failure(&self, id: i64) -> Result<i64> {
    let conn = self.db.lock()?;

    conn
      .execute(
        "UPDATE offline_queue SET attempts = attempts + 1 WHERE id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to record failure for item {}: {}", id, e))?;

    let attempts: i64 = conn
      .query_row(
        "SELECT attempts FROM offline_queue WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read attempts for item {}: {}", id, e))?;

    Ok(attempts)
  }

  /// Move an item to the dead-letter state so it is no longer replayed.
  pub fn mark_dead(&self, id: i64) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "UPDATE offline_queue SET status = ? WHERE id = ?",
        params![STATUS_DEAD, id],
      )
      .map_err(|e| eyre!("Failed to dead-letter item {}: {}", id, e))?;
    Ok(())
  }

  /// Number of items still waiting for replay.
  pub fn pending_count(&self) -> Result<i64> {
    self.count_by_status(STATUS_PENDING)
  }

  /// Number of dead-lettered items.
  pub fn dead_count(&self) -> Result<i64> {
    self.count_by_status(STATUS_DEAD)
  }

  fn count_by_status(&self, status: &str) -> Result<i64> {
    self
      .db
      .lock()?
      .query_row(
        "SELECT COUNT(*) FROM offline_queue WHERE status = ?",
        params![status],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count queue items: {}", e))
  }
}
