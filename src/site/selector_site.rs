//! Site extractor driven by CSS selectors from the configuration file

use crate::config::{FieldRule, PaginationStrategy, SiteConfig};
use crate::site::json_ld::product_from_json_ld;
use crate::site::product::{parse_price_text, RawProduct};
use crate::site::{DiscoveredLink, SiteExtractor};
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A compiled field rule
#[derive(Debug, Clone)]
struct CompiledRule {
    selector: Selector,
    attr: Option<String>,
}

impl CompiledRule {
    fn compile(rule: &FieldRule) -> Result<Self, ConfigError> {
        Ok(Self {
            selector: compile(&rule.selector)?,
            attr: rule.attr.clone(),
        })
    }

    /// Value of the first matching element inside `scope`
    fn extract(&self, scope: ElementRef<'_>) -> Option<String> {
        let element = scope.select(&self.selector).next()?;
        let value = match &self.attr {
            Some(attr) => element.value().attr(attr)?.to_string(),
            None => element_text(element),
        };
        let value = value.trim().to_string();
        (!value.is_empty()).then_some(value)
    }

    fn matches(&self, scope: ElementRef<'_>) -> bool {
        scope.select(&self.selector).next().is_some()
    }
}

#[derive(Debug, Clone, Default)]
struct ProductRules {
    id: Option<CompiledRule>,
    name: Option<CompiledRule>,
    url: Option<CompiledRule>,
    price: Option<CompiledRule>,
    original_price: Option<CompiledRule>,
    currency: Option<CompiledRule>,
    image: Option<CompiledRule>,
    in_stock: Option<CompiledRule>,
}

impl ProductRules {
    fn extract(&self, scope: ElementRef<'_>, base_url: &Url) -> RawProduct {
        let get = |rule: &Option<CompiledRule>| rule.as_ref().and_then(|r| r.extract(scope));

        RawProduct {
            id: get(&self.id),
            name: get(&self.name),
            url: get(&self.url).and_then(|href| resolve_link(&href, base_url)),
            current_price: get(&self.price).and_then(|p| parse_price_text(&p)),
            original_price: get(&self.original_price).and_then(|p| parse_price_text(&p)),
            currency: get(&self.currency),
            category: None,
            image: get(&self.image)
                .map(|src| first_srcset_entry(&src))
                .and_then(|src| resolve_link(&src, base_url))
                .map(String::from),
            in_stock: self.in_stock.as_ref().map(|r| r.matches(scope)),
        }
    }
}

/// `SiteExtractor` built from a `[site]` configuration section
#[derive(Debug, Clone)]
pub struct SelectorSite {
    default_currency: String,
    category_links: Option<Selector>,
    subcategory_links: Option<Selector>,
    product_links: Option<Selector>,
    breadcrumbs: Option<Selector>,
    pagination_strategy: PaginationStrategy,
    page_index: Option<Selector>,
    page_url_template: String,
    next_link: Option<Selector>,
    item: Option<Selector>,
    product: ProductRules,
}

impl SelectorSite {
    /// Compiles every selector of the site configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SelectorSite)` - All selectors compiled
    /// * `Err(ConfigError::InvalidSelector)` - A selector failed to parse
    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigError> {
        let optional = |s: &Option<String>| s.as_deref().map(compile).transpose();
        let rule = |r: &Option<FieldRule>| r.as_ref().map(CompiledRule::compile).transpose();

        let p = &config.product;
        Ok(Self {
            default_currency: config.default_currency.clone(),
            category_links: optional(&config.category_links)?,
            subcategory_links: optional(&config.subcategory_links)?,
            product_links: optional(&config.product_links)?,
            breadcrumbs: optional(&config.breadcrumbs)?,
            pagination_strategy: config.pagination.strategy,
            page_index: optional(&config.pagination.page_index)?,
            page_url_template: config.pagination.page_url_template.clone(),
            next_link: optional(&config.pagination.next_link)?,
            item: optional(&p.item)?,
            product: ProductRules {
                id: rule(&p.id)?,
                name: rule(&p.name)?,
                url: rule(&p.url)?,
                price: rule(&p.price)?,
                original_price: rule(&p.original_price)?,
                currency: rule(&p.currency)?,
                image: rule(&p.image)?,
                in_stock: rule(&p.in_stock)?,
            },
        })
    }

    fn links(selector: &Option<Selector>, document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
        let Some(selector) = selector else {
            return Vec::new();
        };

        document
            .select(selector)
            .filter_map(|element| {
                let href = element.value().attr("href")?;
                let url = resolve_link(href, base_url)?;
                Some(DiscoveredLink {
                    url,
                    text: element_text(element),
                })
            })
            .collect()
    }
}

impl SiteExtractor for SelectorSite {
    fn default_currency(&self) -> &str {
        &self.default_currency
    }

    fn category_links(&self, document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
        Self::links(&self.category_links, document, base_url)
    }

    fn subcategory_links(&self, document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
        Self::links(&self.subcategory_links, document, base_url)
    }

    fn product_links(&self, document: &Html, base_url: &Url) -> Vec<Url> {
        Self::links(&self.product_links, document, base_url)
            .into_iter()
            .map(|link| link.url)
            .collect()
    }

    fn pagination_strategy(&self) -> PaginationStrategy {
        self.pagination_strategy
    }

    fn page_url_template(&self) -> &str {
        &self.page_url_template
    }

    fn page_index_cells(&self, document: &Html) -> Vec<String> {
        match &self.page_index {
            Some(selector) => document.select(selector).map(element_text).collect(),
            None => Vec::new(),
        }
    }

    fn next_page_link(&self, document: &Html, base_url: &Url) -> Option<Url> {
        Self::links(&self.next_link, document, base_url)
            .into_iter()
            .next()
            .map(|link| link.url)
    }

    fn breadcrumbs(&self, document: &Html) -> Option<String> {
        let selector = self.breadcrumbs.as_ref()?;
        let crumbs: Vec<String> = document
            .select(selector)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        (!crumbs.is_empty()).then(|| crumbs.join(" > "))
    }

    fn listing_products(&self, document: &Html, base_url: &Url) -> Vec<RawProduct> {
        let Some(item) = &self.item else {
            return Vec::new();
        };

        document
            .select(item)
            .map(|element| self.product.extract(element, base_url))
            .collect()
    }

    fn detail_product(&self, document: &Html, base_url: &Url) -> Option<RawProduct> {
        let from_rules = self.product.extract(document.root_element(), base_url);
        let product = match product_from_json_ld(document, base_url) {
            Some(from_json) => from_json.or(from_rules),
            None => from_rules,
        };

        let found = product.id.is_some()
            || product.name.is_some()
            || product.current_price.is_some();
        found.then_some(product)
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Whitespace-collapsed text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First URL of a `srcset` value, or the value itself
fn first_srcset_entry(value: &str) -> String {
    value
        .split(',')
        .next()
        .and_then(|entry| entry.split_whitespace().next())
        .unwrap_or(value)
        .to_string()
}
