//! Offline command interpreter.
//!
//! Best-effort answers to a constrained set of natural-language commands when
//! the network is down, computed purely from the cached account snapshot. The
//! interpreter is read-only: it never touches the queue or the snapshot, and
//! a parsed transaction is only a suggestion the caller may choose to
//! enqueue.

mod brands;
mod rules;

pub use brands::{Brand, BRANDS, DEFAULT_CATEGORY, DEFAULT_COLOR};
pub use rules::{parse_amount, RuleKind, RULES};

use color_eyre::Result;
use regex::Captures;

use crate::snapshot::{Account, Card, SnapshotStore, Subscription};

/// Direction of a parsed transaction shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
  Expense,
  Income,
}

/// Structured transaction extracted from shorthand like
/// "gastei 45,90 no uber".
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
  pub kind: TransactionKind,
  pub amount: f64,
  pub description: String,
  pub category: String,
  pub color: String,
  pub icon: Option<String>,
}

/// What the interpreter hands back for a recognized command.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflineReply {
  Balance {
    total: f64,
    accounts: Vec<Account>,
  },
  Cards {
    total_limit: f64,
    total_used: f64,
    total_available: f64,
    cards: Vec<Card>,
  },
  Subscriptions {
    monthly_total: f64,
    subscriptions: Vec<Subscription>,
  },
  Transaction(ParsedTransaction),
  /// The snapshot has nothing cached for this query. Distinct from a
  /// legitimate zero-value answer.
  NoCachedData {
    message: String,
  },
}

/// Interpret one input line against the cached snapshot. `None` means the
/// input matched no known command; the caller shows its generic fallback.
pub fn interpret(input: &str, snapshot: &SnapshotStore) -> Result<Option<OfflineReply>> {
  interpret_with_brands(input, snapshot, BRANDS)
}

/// Same as [`interpret`] with an explicit brand table.
pub fn interpret_with_brands(
  input: &str,
  snapshot: &SnapshotStore,
  table: &[Brand],
) -> Result<Option<OfflineReply>> {
  let input = input.trim();

  for rule in RULES.iter() {
    let Some(caps) = rule.pattern.captures(input) else {
      continue;
    };

    let reply = match rule.kind {
      RuleKind::Balance => balance_reply(snapshot)?,
      RuleKind::Cards => cards_reply(snapshot)?,
      RuleKind::Subscriptions => subscriptions_reply(snapshot)?,
      RuleKind::Expense => match transaction_reply(TransactionKind::Expense, &caps, table) {
        Some(reply) => reply,
        None => continue,
      },
      RuleKind::Income => match transaction_reply(TransactionKind::Income, &caps, table) {
        Some(reply) => reply,
        None => continue,
      },
    };

    return Ok(Some(reply));
  }

  Ok(None)
}

fn balance_reply(snapshot: &SnapshotStore) -> Result<OfflineReply> {
  let accounts = snapshot.accounts()?.unwrap_or_default();

  if accounts.is_empty() {
    return Ok(OfflineReply::NoCachedData {
      message: "Nenhuma conta encontrada em cache.".to_string(),
    });
  }

  let total = accounts.iter().map(|a| a.balance).sum();
  Ok(OfflineReply::Balance { total, accounts })
}

fn cards_reply(snapshot: &SnapshotStore) -> Result<OfflineReply> {
  let cards = snapshot.cards()?.unwrap_or_default();

  if cards.is_empty() {
    return Ok(OfflineReply::NoCachedData {
      message: "Nenhum cartão encontrado em cache.".to_string(),
    });
  }

  let total_limit = cards.iter().map(|c| c.limit).sum();
  let total_used = cards.iter().map(|c| c.used).sum();
  let total_available = cards.iter().map(|c| c.available()).sum();

  Ok(OfflineReply::Cards {
    total_limit,
    total_used,
    total_available,
    cards,
  })
}

fn subscriptions_reply(snapshot: &SnapshotStore) -> Result<OfflineReply> {
  let subscriptions = snapshot.subscriptions()?.unwrap_or_default();

  if subscriptions.is_empty() {
    return Ok(OfflineReply::NoCachedData {
      message: "Nenhuma assinatura encontrada em cache.".to_string(),
    });
  }

  let monthly_total = subscriptions.iter().map(|s| s.amount).sum();
  Ok(OfflineReply::Subscriptions {
    monthly_total,
    subscriptions,
  })
}

fn transaction_reply(
  kind: TransactionKind,
  caps: &Captures<'_>,
  table: &[Brand],
) -> Option<OfflineReply> {
  let amount = parse_amount(caps.get(2)?.as_str())?;
  let raw = caps.get(3)?.as_str().trim().trim_end_matches(['.', '!', '?']);

  let transaction = match brands::detect(table, raw) {
    Some(brand) => ParsedTransaction {
      kind,
      amount,
      description: brand.name.to_string(),
      category: brand.category.to_string(),
      color: brand.color.to_string(),
      icon: Some(brand.icon.to_string()),
    },
    None => ParsedTransaction {
      kind,
      amount,
      description: raw.to_string(),
      category: DEFAULT_CATEGORY.to_string(),
      color: DEFAULT_COLOR.to_string(),
      icon: None,
    },
  };

  Some(OfflineReply::Transaction(transaction))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;

  fn test_snapshot() -> (SnapshotStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("test.db")).unwrap();
    (SnapshotStore::new(db), dir)
  }

  #[test]
  fn test_expense_without_brand_match_keeps_raw_text() {
    let (snapshot, _dir) = test_snapshot();

    // Empty brand table: "uber" stays verbatim with defaults
    let reply = interpret_with_brands("gastei 45,90 no uber", &snapshot, &[])
      .unwrap()
      .unwrap();

    assert_eq!(
      reply,
      OfflineReply::Transaction(ParsedTransaction {
        kind: TransactionKind::Expense,
        amount: 45.9,
        description: "uber".to_string(),
        category: DEFAULT_CATEGORY.to_string(),
        color: DEFAULT_COLOR.to_string(),
        icon: None,
      })
    );
  }

  #[test]
  fn test_expense_with_brand_match_is_enriched() {
    let (snapshot, _dir) = test_snapshot();

    let reply = interpret("gastei 30 no ifood", &snapshot).unwrap().unwrap();

    let OfflineReply::Transaction(tx) = reply else {
      panic!("expected transaction");
    };
    assert_eq!(tx.description, "iFood");
    assert_eq!(tx.category, "ALIMENTACAO");
    assert_eq!(tx.icon.as_deref(), Some("utensils"));
  }

  #[test]
  fn test_income_with_optional_connector() {
    let (snapshot, _dir) = test_snapshot();

    let reply = interpret("recebi 1500,50 do freela", &snapshot)
      .unwrap()
      .unwrap();

    let OfflineReply::Transaction(tx) = reply else {
      panic!("expected transaction");
    };
    assert_eq!(tx.kind, TransactionKind::Income);
    assert_eq!(tx.amount, 1500.5);
    assert_eq!(tx.description, "freela");
  }

  #[test]
  fn test_balance_with_empty_snapshot_reports_no_cached_data() {
    let (snapshot, _dir) = test_snapshot();

    let reply = interpret("saldo", &snapshot).unwrap().unwrap();

    assert_eq!(
      reply,
      OfflineReply::NoCachedData {
        message: "Nenhuma conta encontrada em cache.".to_string(),
      }
    );
  }

  #[test]
  fn test_balance_sums_cached_accounts() {
    let (snapshot, _dir) = test_snapshot();
    snapshot
      .put_accounts(&[
        Account {
          name: "Corrente".to_string(),
          balance: 1200.0,
        },
        Account {
          name: "Poupança".to_string(),
          balance: 300.5,
        },
      ])
      .unwrap();

    let reply = interpret("quanto eu tenho?", &snapshot).unwrap().unwrap();

    let OfflineReply::Balance { total, accounts } = reply else {
      panic!("expected balance");
    };
    assert_eq!(total, 1500.5);
    assert_eq!(accounts.len(), 2);
  }

  #[test]
  fn test_cards_report_totals() {
    let (snapshot, _dir) = test_snapshot();
    snapshot
      .put_cards(&[
        Card {
          name: "Visa".to_string(),
          limit: 5000.0,
          used: 1200.0,
        },
        Card {
          name: "Master".to_string(),
          limit: 3000.0,
          used: 500.0,
        },
      ])
      .unwrap();

    let reply = interpret("fatura", &snapshot).unwrap().unwrap();

    let OfflineReply::Cards {
      total_limit,
      total_used,
      total_available,
      cards,
    } = reply
    else {
      panic!("expected cards");
    };
    assert_eq!(total_limit, 8000.0);
    assert_eq!(total_used, 1700.0);
    assert_eq!(total_available, 6300.0);
    assert_eq!(cards.len(), 2);
  }

  #[test]
  fn test_subscriptions_report_monthly_total() {
    let (snapshot, _dir) = test_snapshot();
    snapshot
      .put_subscriptions(&[
        Subscription {
          name: "Netflix".to_string(),
          amount: 39.9,
        },
        Subscription {
          name: "Spotify".to_string(),
          amount: 19.9,
        },
      ])
      .unwrap();

    let reply = interpret("minhas assinaturas", &snapshot).unwrap().unwrap();

    let OfflineReply::Subscriptions { monthly_total, .. } = reply else {
      panic!("expected subscriptions");
    };
    assert!((monthly_total - 59.8).abs() < 1e-9);
  }

  #[test]
  fn test_unrecognized_input_returns_none() {
    let (snapshot, _dir) = test_snapshot();

    assert!(interpret("bom dia", &snapshot).unwrap().is_none());
  }
}
