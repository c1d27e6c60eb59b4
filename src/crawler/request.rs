//! Crawl requests and their routing labels

use crate::url::{normalize_parsed, normalize_url};
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Metadata key carrying the human-readable category of a listing
pub const CATEGORY_KEY: &str = "category";

/// Tag deciding which handler processes a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    /// The shop's entry page, listing top-level categories
    Root,
    Category,
    Subcategory,
    /// Page 2..n of a listing
    PaginatedPage,
    ProductDetail,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::Root,
        Label::Category,
        Label::Subcategory,
        Label::PaginatedPage,
        Label::ProductDetail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "ROOT",
            Self::Category => "CATEGORY",
            Self::Subcategory => "SUBCATEGORY",
            Self::PaginatedPage => "PAGINATED_PAGE",
            Self::ProductDetail => "PRODUCT_DETAIL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }

    /// Returns true for labels whose pages list products
    pub fn is_listing(&self) -> bool {
        matches!(
            self,
            Self::Category | Self::Subcategory | Self::PaginatedPage
        )
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of crawl work
///
/// The URL is always normalized, so two requests for the same page share one
/// `unique_key`. Requests are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    url: Url,
    label: Label,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Request {
    /// Creates a request for an already parsed URL, normalizing it
    pub fn new(url: Url, label: Label) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_parsed(url)?,
            label,
            metadata: BTreeMap::new(),
        })
    }

    /// Parses and normalizes `url`
    pub fn parse(url: &str, label: Label) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_url(url)?,
            label,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Copies the category of `parent`, if it has one
    pub fn inherit_category(self, parent: &Request) -> Self {
        match parent.category() {
            Some(category) => {
                let category = category.to_string();
                self.with_metadata(CATEGORY_KEY, category)
            }
            None => self,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get(CATEGORY_KEY).map(String::as_str)
    }

    /// Frontier identity of this request
    pub fn unique_key(&self) -> &str {
        self.url.as_str()
    }
}
