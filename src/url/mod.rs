//! URL handling module for Pricewatch
//!
//! This module provides URL normalization (the frontier's identity function)
//! and a few helpers the page handlers use when deriving new requests.

mod normalize;

use url::Url;

pub use normalize::{normalize_parsed, normalize_url};

/// Returns true if the URL carries a non-empty query string
///
/// Listing URLs with a query are already filtered or paginated views of a
/// category and are not followed as fresh subcategories.
pub fn has_query(url: &Url) -> bool {
    url.query().is_some_and(|q| !q.is_empty())
}

/// Returns the URL without its query string and fragment
///
/// This is the `{base}` a pagination template is expanded against.
pub fn page_base(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

/// Resolves a link href against a base URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url)
    } else {
        None
    }
}
