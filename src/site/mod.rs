//! Per-site extraction
//!
//! Page handlers never touch selectors directly; they ask a `SiteExtractor`
//! for links, pagination cells and raw products. `SelectorSite` implements it
//! from the `[site]` section of the configuration.

mod json_ld;
mod product;
mod selector_site;

pub use json_ld::{json_ld_items, product_from_json_ld};
pub use product::{parse_price_text, CandidateProduct, RawProduct};
pub use selector_site::SelectorSite;

use crate::config::PaginationStrategy;
use scraper::Html;
use url::Url;

/// An anchor found on a page, resolved to an absolute URL
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    pub url: Url,
    /// Whitespace-collapsed anchor text
    pub text: String,
}

/// Site-specific field extraction
///
/// Every method is best effort: a page missing the expected markup yields
/// empty results rather than an error.
pub trait SiteExtractor: Send + Sync {
    /// Currency assumed when a product does not state one
    fn default_currency(&self) -> &str;

    /// Top-level category links on the root page
    fn category_links(&self, document: &Html, base_url: &Url) -> Vec<DiscoveredLink>;

    /// Subcategory links on a category or subcategory page
    fn subcategory_links(&self, document: &Html, base_url: &Url) -> Vec<DiscoveredLink>;

    /// Links from a listing page to product detail pages
    fn product_links(&self, document: &Html, base_url: &Url) -> Vec<Url>;

    fn pagination_strategy(&self) -> PaginationStrategy;

    /// Template for page URLs, with `{base}` and `{n}` placeholders
    fn page_url_template(&self) -> &str;

    /// Text of each page-index cell, in document order
    fn page_index_cells(&self, document: &Html) -> Vec<String>;

    /// Target of the "next page" link, if present
    fn next_page_link(&self, document: &Html, base_url: &Url) -> Option<Url>;

    /// Breadcrumb trail joined with " > "
    fn breadcrumbs(&self, document: &Html) -> Option<String>;

    /// One raw product per item tile on a listing page
    fn listing_products(&self, document: &Html, base_url: &Url) -> Vec<RawProduct>;

    /// The product shown on a detail page
    fn detail_product(&self, document: &Html, base_url: &Url) -> Option<RawProduct>;
}
