//! Data-driven command grammar.
//!
//! One rule per recognized command shape; dispatch walks the table in order,
//! so the transaction grammars come before the keyword queries ("paguei 120
//! no cartão" is an expense, not a cards query).

use regex::Regex;
use std::sync::LazyLock;

/// What a matched rule means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
  Expense,
  Income,
  Balance,
  Cards,
  Subscriptions,
}

/// A recognized command shape.
pub struct Rule {
  pub kind: RuleKind,
  pub pattern: Regex,
}

/// The full grammar. Capture groups for the transaction shapes:
/// 1 = verb, 2 = amount, 3 = free-text description/source.
pub static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
  vec![
    Rule {
      kind: RuleKind::Expense,
      pattern: Regex::new(
        r"(?i)\b(gastei|paguei|comprei)\s+(?:r\$\s*)?(\d+(?:[.,]\d{1,2})?)\s+(?:no|na|em|de|com)\s+(.+)",
      )
      .unwrap(),
    },
    Rule {
      kind: RuleKind::Income,
      pattern: Regex::new(
        r"(?i)\b(recebi|ganhei|entrou)\s+(?:r\$\s*)?(\d+(?:[.,]\d{1,2})?)(?:\s+(?:do|da|de|por))?\s+(.+)",
      )
      .unwrap(),
    },
    Rule {
      kind: RuleKind::Balance,
      pattern: Regex::new(r"(?i)\b(saldo|quanto\s+(?:eu\s+)?tenho)\b").unwrap(),
    },
    Rule {
      kind: RuleKind::Cards,
      pattern: Regex::new(r"(?i)\b(cart(?:ão|ao|ões|oes)|fatura|limite)\b").unwrap(),
    },
    Rule {
      kind: RuleKind::Subscriptions,
      pattern: Regex::new(r"(?i)\b(assinaturas?|mensalidades?)\b").unwrap(),
    },
  ]
});

/// Parse an amount that uses either comma or period as decimal separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
  raw.replace(',', ".").parse().ok()
}
