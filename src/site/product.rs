//! Product records extracted from shop pages

use crate::url::normalize_parsed;
use serde::Serialize;
use url::Url;

/// Product fields as scraped, before any validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProduct {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Absolute product URL, if the page exposed one
    pub url: Option<Url>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub in_stock: Option<bool>,
}

impl RawProduct {
    /// Fills every missing field from `other`
    pub fn or(self, other: RawProduct) -> RawProduct {
        RawProduct {
            id: self.id.or(other.id),
            name: self.name.or(other.name),
            url: self.url.or(other.url),
            current_price: self.current_price.or(other.current_price),
            original_price: self.original_price.or(other.original_price),
            currency: self.currency.or(other.currency),
            category: self.category.or(other.category),
            image: self.image.or(other.image),
            in_stock: self.in_stock.or(other.in_stock),
        }
    }
}

/// A validated, not yet deduplicated product record
///
/// Only `from_raw` builds one, so every candidate carries a positive finite
/// price and a consistent `discounted` flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProduct {
    item_id: Option<String>,
    item_name: Option<String>,
    item_url: Url,
    current_price: f64,
    original_price: Option<f64>,
    discounted: bool,
    currency: String,
    category: Option<String>,
    img: Option<String>,
    in_stock: Option<bool>,
}

impl CandidateProduct {
    /// Validates a raw product
    ///
    /// # Arguments
    ///
    /// * `raw` - Scraped fields
    /// * `page_url` - URL of the page the product was found on; used when the
    ///   product has no URL of its own
    /// * `default_currency` - Currency used when the page does not state one
    /// * `fallback_category` - Category used when the product has none
    ///
    /// # Returns
    ///
    /// `None` when the current price is missing, not finite or not positive
    pub fn from_raw(
        raw: RawProduct,
        page_url: &Url,
        default_currency: &str,
        fallback_category: Option<&str>,
    ) -> Option<Self> {
        let current_price = raw.current_price.filter(|p| p.is_finite() && *p > 0.0)?;
        let original_price = raw.original_price.filter(|p| p.is_finite() && *p > 0.0);
        let discounted = original_price.is_some_and(|o| o > current_price);

        let item_url = raw.url.unwrap_or_else(|| page_url.clone());
        let item_url = normalize_parsed(item_url.clone()).unwrap_or(item_url);

        Some(Self {
            item_id: raw.id.filter(|id| !id.is_empty()),
            item_name: raw.name,
            item_url,
            current_price,
            original_price,
            discounted,
            currency: raw
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_currency.to_string()),
            category: raw
                .category
                .filter(|c| !c.is_empty())
                .or_else(|| fallback_category.map(str::to_string)),
            img: raw.image,
            in_stock: raw.in_stock,
        })
    }

    /// Identity of this product in the dedup ledger
    ///
    /// The shop's item id when known, otherwise the normalized product URL.
    pub fn ledger_key(&self) -> String {
        match &self.item_id {
            Some(id) => id.clone(),
            None => self.item_url.to_string(),
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn item_name(&self) -> Option<&str> {
        self.item_name.as_deref()
    }

    pub fn item_url(&self) -> &Url {
        &self.item_url
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn original_price(&self) -> Option<f64> {
        self.original_price
    }

    pub fn discounted(&self) -> bool {
        self.discounted
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn img(&self) -> Option<&str> {
        self.img.as_deref()
    }

    pub fn in_stock(&self) -> Option<bool> {
        self.in_stock
    }
}

/// Parses a human-formatted price such as `1 299,90 Kč` or `$1,299.90`
///
/// Currency symbols and whitespace (including non-breaking spaces) are
/// ignored. When both `,` and `.` occur, the later one is the decimal
/// separator. A lone separator followed by exactly three digits is taken as a
/// thousands separator.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',' || c == '-');

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => single_separator(cleaned, ','),
        (None, Some(_)) => single_separator(cleaned, '.'),
        (None, None) => cleaned.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

fn single_separator(text: &str, sep: char) -> String {
    let parts: Vec<&str> = text.split(sep).collect();
    let is_decimal = parts.len() == 2 && parts[1].len() != 3;
    if is_decimal {
        parts.join(".")
    } else {
        parts.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://shop.example.com/leky").unwrap()
    }

    fn raw(price: Option<f64>) -> RawProduct {
        RawProduct {
            id: Some("123".to_string()),
            name: Some("Paralen 500mg".to_string()),
            url: Some(Url::parse("https://shop.example.com/paralen?utm_source=x").unwrap()),
            current_price: price,
            ..RawProduct::default()
        }
    }

    #[test]
    fn test_missing_price_is_dropped() {
        assert!(CandidateProduct::from_raw(raw(None), &page(), "CZK", None).is_none());
    }

    #[test]
    fn test_non_positive_or_non_finite_price_is_dropped() {
        for price in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(
                CandidateProduct::from_raw(raw(Some(price)), &page(), "CZK", None).is_none(),
                "price {} should be rejected",
                price
            );
        }
    }

    #[test]
    fn test_discounted_only_when_original_is_higher() {
        let mut r = raw(Some(100.0));
        r.original_price = Some(150.0);
        let c = CandidateProduct::from_raw(r, &page(), "CZK", None).unwrap();
        assert!(c.discounted());
        assert_eq!(c.original_price(), Some(150.0));

        let mut r = raw(Some(100.0));
        r.original_price = Some(100.0);
        assert!(!CandidateProduct::from_raw(r, &page(), "CZK", None)
            .unwrap()
            .discounted());

        let c = CandidateProduct::from_raw(raw(Some(100.0)), &page(), "CZK", None).unwrap();
        assert!(!c.discounted());
        assert_eq!(c.original_price(), None);
    }

    #[test]
    fn test_defaults_and_fallbacks() {
        let mut r = raw(Some(89.9));
        r.url = None;
        let c = CandidateProduct::from_raw(r, &page(), "CZK", Some("Léky")).unwrap();

        assert_eq!(c.currency(), "CZK");
        assert_eq!(c.category(), Some("Léky"));
        assert_eq!(c.item_url().as_str(), "https://shop.example.com/leky");
    }

    #[test]
    fn test_own_category_wins_over_fallback() {
        let mut r = raw(Some(89.9));
        r.category = Some("Léky > Bolest".to_string());
        let c = CandidateProduct::from_raw(r, &page(), "CZK", Some("Léky")).unwrap();
        assert_eq!(c.category(), Some("Léky > Bolest"));
    }

    #[test]
    fn test_ledger_key_prefers_id() {
        let c = CandidateProduct::from_raw(raw(Some(10.0)), &page(), "CZK", None).unwrap();
        assert_eq!(c.ledger_key(), "123");

        let mut r = raw(Some(10.0));
        r.id = None;
        let c = CandidateProduct::from_raw(r, &page(), "CZK", None).unwrap();
        assert_eq!(c.ledger_key(), "https://shop.example.com/paralen");
    }

    #[test]
    fn test_serializes_camel_case() {
        let c = CandidateProduct::from_raw(raw(Some(10.0)), &page(), "CZK", None).unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["itemId"], "123");
        assert_eq!(json["currentPrice"], 10.0);
        assert_eq!(json["discounted"], false);
    }

    #[test]
    fn test_raw_or_fills_missing_fields() {
        let primary = RawProduct {
            name: Some("A".to_string()),
            ..RawProduct::default()
        };
        let fallback = RawProduct {
            name: Some("B".to_string()),
            current_price: Some(5.0),
            ..RawProduct::default()
        };
        let merged = primary.or(fallback);
        assert_eq!(merged.name.as_deref(), Some("A"));
        assert_eq!(merged.current_price, Some(5.0));
    }

    #[test]
    fn test_parse_price_text() {
        assert_eq!(parse_price_text("129 Kč"), Some(129.0));
        assert_eq!(parse_price_text("1 299,90 Kč"), Some(1299.9));
        assert_eq!(parse_price_text("1\u{a0}299,90\u{a0}Kč"), Some(1299.9));
        assert_eq!(parse_price_text("$1,299.90"), Some(1299.9));
        assert_eq!(parse_price_text("1.299,90 €"), Some(1299.9));
        assert_eq!(parse_price_text("1,299"), Some(1299.0));
        assert_eq!(parse_price_text("12.50"), Some(12.5));
        assert_eq!(parse_price_text("129,-"), Some(129.0));
        assert_eq!(parse_price_text("Kč"), None);
        assert_eq!(parse_price_text(""), None);
    }
}
