//! Persisted chat history with optimistic delivery status.
//!
//! Messages are written locally the moment the user sends them, with status
//! `pending`. When the sync engine replays the matching queued request and
//! the server acknowledges it, the row flips to `delivered`. The queue item's
//! merged `offlineId` is the join key.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;

use crate::db::Database;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_DELIVERED: &str = "delivered";

/// One persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
  pub id: i64,
  /// Client-generated id shared with the queued request for dedup
  pub offline_id: String,
  pub content: String,
  pub timestamp: i64,
  pub status: String,
}

#[derive(Clone)]
pub struct ChatStore {
  db: Arc<Database>,
}

impl ChatStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Store a message optimistically with status `pending`.
  pub fn append(&self, offline_id: &str, content: &str) -> Result<ChatMessage> {
    let conn = self.db.lock()?;
    let timestamp = Utc::now().timestamp_millis();

    conn
      .execute(
        "INSERT INTO chat_messages (offline_id, content, timestamp, status)
         VALUES (?, ?, ?, ?)",
        params![offline_id, content, timestamp, STATUS_PENDING],
      )
      .map_err(|e| eyre!("Failed to store chat message: {}", e))?;

    Ok(ChatMessage {
      id: conn.last_insert_rowid(),
      offline_id: offline_id.to_string(),
      content: content.to_string(),
      timestamp,
      status: STATUS_PENDING.to_string(),
    })
  }

  /// All messages, oldest first.
  pub fn list(&self) -> Result<Vec<ChatMessage>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, offline_id, content, timestamp, status
         FROM chat_messages ORDER BY timestamp ASC, id ASC",
      )
      .map_err(|e| eyre!("Failed to prepare chat query: {}", e))?;

    let messages = stmt
      .query_map([], |row| {
        Ok(ChatMessage {
          id: row.get(0)?,
          offline_id: row.get(1)?,
          content: row.get(2)?,
          timestamp: row.get(3)?,
          status: row.get(4)?,
        })
      })
      .map_err(|e| eyre!("Failed to query chat messages: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read chat row: {}", e))?;

    Ok(messages)
  }

  /// Flip a message to `delivered` once its queued request was acknowledged.
  /// Returns false (not an error) when no message carries the offline id.
  pub fn mark_delivered(&self, offline_id: &str) -> Result<bool> {
    let updated = self
      .db
      .lock()?
      .execute(
        "UPDATE chat_messages SET status = ? WHERE offline_id = ?",
        params![STATUS_DELIVERED, offline_id],
      )
      .map_err(|e| eyre!("Failed to mark message delivered: {}", e))?;

    Ok(updated > 0)
  }
}
