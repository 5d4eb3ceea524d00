//! Brand-detection lookup for free-text transaction descriptions.

/// Category and color applied when no brand matches.
pub const DEFAULT_CATEGORY: &str = "OUTROS";
pub const DEFAULT_COLOR: &str = "#6366f1";

/// A known merchant/brand with its canonical presentation.
#[derive(Debug, Clone)]
pub struct Brand {
  pub keywords: &'static [&'static str],
  pub name: &'static str,
  pub icon: &'static str,
  pub category: &'static str,
  pub color: &'static str,
}

/// Known brands, scanned in order; first keyword hit wins.
pub const BRANDS: &[Brand] = &[
  Brand {
    keywords: &["uber", "99pop", "99 pop"],
    name: "Uber",
    icon: "car",
    category: "TRANSPORTE",
    color: "#000000",
  },
  Brand {
    keywords: &["ifood", "i-food"],
    name: "iFood",
    icon: "utensils",
    category: "ALIMENTACAO",
    color: "#ea1d2c",
  },
  Brand {
    keywords: &["rappi"],
    name: "Rappi",
    icon: "shopping-bag",
    category: "ALIMENTACAO",
    color: "#ff441f",
  },
  Brand {
    keywords: &["netflix"],
    name: "Netflix",
    icon: "tv",
    category: "ASSINATURAS",
    color: "#e50914",
  },
  Brand {
    keywords: &["spotify"],
    name: "Spotify",
    icon: "music",
    category: "ASSINATURAS",
    color: "#1db954",
  },
  Brand {
    keywords: &["amazon"],
    name: "Amazon",
    icon: "package",
    category: "COMPRAS",
    color: "#ff9900",
  },
  Brand {
    keywords: &["mercado livre", "mercadolivre", "meli"],
    name: "Mercado Livre",
    icon: "shopping-cart",
    category: "COMPRAS",
    color: "#ffe600",
  },
  Brand {
    keywords: &["carrefour", "extra", "pao de acucar", "pão de açúcar"],
    name: "Supermercado",
    icon: "shopping-cart",
    category: "MERCADO",
    color: "#22c55e",
  },
];

/// Look up a brand by substring match against the lowercased description.
pub fn detect<'a>(table: &'a [Brand], description: &str) -> Option<&'a Brand> {
  let normalized = description.to_lowercase();
  table
    .iter()
    .find(|brand| brand.keywords.iter().any(|k| normalized.contains(k)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_detect_matches_case_insensitive() {
    let brand = detect(BRANDS, "Almoço no IFOOD").unwrap();
    assert_eq!(brand.name, "iFood");
    assert_eq!(brand.category, "ALIMENTACAO");
  }

  #[test]
  fn test_detect_misses_unknown_merchant() {
    assert!(detect(BRANDS, "padaria da esquina").is_none());
  }
}
