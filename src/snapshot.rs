//! Cached account snapshot: read-only copies of server state.
//!
//! Written whenever the app fetches live data successfully, read only by the
//! offline interpreter. Each key holds one serialized JSON document and is
//! overwritten wholesale on refresh; there is no merging and the snapshot is
//! never the source of truth.
//!
//! Upstream payloads are loosely shaped (`balance` vs `currentBalance`,
//! `limit` vs `creditLimit`). The serde aliases below normalize them into one
//! canonical form at the deserialization boundary so consumers never branch
//! on field names.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Database;

const KEY_ACCOUNTS: &str = "accounts";
const KEY_CARDS: &str = "cards";
const KEY_SUBSCRIPTIONS: &str = "subscriptions";
const KEY_CATEGORIES: &str = "categories";
const KEY_SUMMARY: &str = "summary";
const KEY_LAST_SYNC: &str = "last_sync";

/// A bank account balance line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
  pub name: String,
  #[serde(alias = "currentBalance")]
  pub balance: f64,
}

/// A credit card with its limit usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
  pub name: String,
  #[serde(alias = "creditLimit")]
  pub limit: f64,
  #[serde(default, alias = "usedAmount")]
  pub used: f64,
}

impl Card {
  pub fn available(&self) -> f64 {
    self.limit - self.used
  }
}

/// A recurring subscription charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
  pub name: String,
  #[serde(alias = "value")]
  pub amount: f64,
}

/// A spending category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub name: String,
  #[serde(default)]
  pub color: Option<String>,
}

/// Aggregate dashboard numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
  #[serde(alias = "totalIncome")]
  pub income: f64,
  #[serde(alias = "totalExpenses")]
  pub expenses: f64,
  #[serde(default, alias = "netBalance")]
  pub balance: f64,
}

/// Store for the cached account snapshot, one JSON blob per key.
#[derive(Clone)]
pub struct SnapshotStore {
  db: Arc<Database>,
}

impl SnapshotStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    self
      .db
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO snapshot_cache (key, data, cached_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store snapshot '{}': {}", key, e))?;

    Ok(())
  }

  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.db.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM snapshot_cache WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .ok();

    match data {
      Some(data) => {
        let value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize snapshot '{}': {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  pub fn put_accounts(&self, accounts: &[Account]) -> Result<()> {
    self.put(KEY_ACCOUNTS, &accounts)
  }

  pub fn accounts(&self) -> Result<Option<Vec<Account>>> {
    self.get(KEY_ACCOUNTS)
  }

  pub fn put_cards(&self, cards: &[Card]) -> Result<()> {
    self.put(KEY_CARDS, &cards)
  }

  pub fn cards(&self) -> Result<Option<Vec<Card>>> {
    self.get(KEY_CARDS)
  }

  pub fn put_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()> {
    self.put(KEY_SUBSCRIPTIONS, &subscriptions)
  }

  pub fn subscriptions(&self) -> Result<Option<Vec<Subscription>>> {
    self.get(KEY_SUBSCRIPTIONS)
  }

  pub fn put_categories(&self, categories: &[Category]) -> Result<()> {
    self.put(KEY_CATEGORIES, &categories)
  }

  pub fn categories(&self) -> Result<Option<Vec<Category>>> {
    self.get(KEY_CATEGORIES)
  }

  pub fn put_summary(&self, summary: &DashboardSummary) -> Result<()> {
    self.put(KEY_SUMMARY, summary)
  }

  pub fn summary(&self) -> Result<Option<DashboardSummary>> {
    self.get(KEY_SUMMARY)
  }

  /// Record when a sync pass last processed at least one item.
  pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
    self.put(KEY_LAST_SYNC, &at)
  }

  pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
    self.get(KEY_LAST_SYNC)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_store() -> (SnapshotStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("test.db")).unwrap();
    (SnapshotStore::new(db), dir)
  }

  #[test]
  fn test_round_trip_accounts() {
    let (store, _dir) = test_store();

    assert!(store.accounts().unwrap().is_none());

    let accounts = vec![
      Account {
        name: "Corrente".to_string(),
        balance: 1200.5,
      },
      Account {
        name: "Poupança".to_string(),
        balance: 300.0,
      },
    ];
    store.put_accounts(&accounts).unwrap();

    assert_eq!(store.accounts().unwrap().unwrap(), accounts);
  }

  #[test]
  fn test_last_write_wins() {
    let (store, _dir) = test_store();

    store
      .put_accounts(&[Account {
        name: "Old".to_string(),
        balance: 1.0,
      }])
      .unwrap();
    store
      .put_accounts(&[Account {
        name: "New".to_string(),
        balance: 2.0,
      }])
      .unwrap();

    let accounts = store.accounts().unwrap().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].name, "New");
  }

  #[test]
  fn test_field_name_drift_is_normalized() {
    // Upstream sometimes sends currentBalance / creditLimit
    let account: Account =
      serde_json::from_str(r#"{"name": "Corrente", "currentBalance": 99.9}"#).unwrap();
    assert_eq!(account.balance, 99.9);

    let card: Card =
      serde_json::from_str(r#"{"name": "Visa", "creditLimit": 5000, "usedAmount": 1250}"#).unwrap();
    assert_eq!(card.limit, 5000.0);
    assert_eq!(card.available(), 3750.0);
  }

  #[test]
  fn test_last_sync_round_trip() {
    let (store, _dir) = test_store();

    assert!(store.last_sync().unwrap().is_none());

    let now = Utc::now();
    store.set_last_sync(now).unwrap();

    assert_eq!(store.last_sync().unwrap().unwrap(), now);
  }
}
