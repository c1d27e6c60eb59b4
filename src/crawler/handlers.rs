//! Page handlers
//!
//! Each handler turns one parsed page into new requests and candidate
//! products. Handlers are pure: they never touch the frontier, the ledger or
//! the stats directly, the coordinator applies their output.

use crate::config::PaginationStrategy;
use crate::crawler::request::{Label, Request, CATEGORY_KEY};
use crate::crawler::router::{HandlerOutput, PageContext};
use crate::site::{CandidateProduct, DiscoveredLink, RawProduct};
use crate::url::{has_query, page_base};
use tracing::{debug, warn};

/// Result of reading a page index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCount {
    /// Fewer than two cells: the listing fits on one page
    SinglePage,
    /// Number of the last page
    Pages(u32),
    /// The cell that should hold the last page number is not a number
    Unparseable(String),
}

/// Reads the last page number from page-index cells
///
/// The last cell is the "next" arrow, so the second-to-last cell holds the
/// number of the last page.
pub fn page_count(cells: &[String]) -> PageCount {
    if cells.len() < 2 {
        return PageCount::SinglePage;
    }

    let cell = cells[cells.len() - 2].trim();
    match cell.parse::<u32>() {
        Ok(n) => PageCount::Pages(n),
        Err(_) => PageCount::Unparseable(cell.to_string()),
    }
}

/// Synthesizes requests for pages `2..=last` of the listing behind `request`
pub fn pagination_requests(request: &Request, last: u32, template: &str) -> Vec<Request> {
    let base = page_base(request.url());

    (2..=last)
        .filter_map(|n| {
            let url = template
                .replace("{base}", &base)
                .replace("{n}", &n.to_string());
            match Request::parse(&url, Label::PaginatedPage) {
                Ok(r) => Some(r.inherit_category(request)),
                Err(e) => {
                    warn!("Skipping page URL {}: {}", url, e);
                    None
                }
            }
        })
        .collect()
}

/// Builds requests for discovered links, tagging each with its anchor text
fn link_requests(links: Vec<DiscoveredLink>, label: Label) -> Vec<Request> {
    links
        .into_iter()
        .filter_map(|link| {
            let request = Request::new(link.url, label).ok()?;
            Some(if link.text.is_empty() {
                request
            } else {
                request.with_metadata(CATEGORY_KEY, link.text)
            })
        })
        .collect()
}

/// Subcategory links, minus filtered views (links carrying a query string)
pub fn subcategory_requests(links: Vec<DiscoveredLink>) -> Vec<Request> {
    let links = links
        .into_iter()
        .filter(|link| !has_query(&link.url))
        .collect();
    link_requests(links, Label::Subcategory)
}

fn product_detail_requests(ctx: &PageContext<'_>) -> Vec<Request> {
    ctx.site
        .product_links(ctx.document, ctx.page_url)
        .into_iter()
        .filter_map(|url| Request::new(url, Label::ProductDetail).ok())
        .map(|r| r.inherit_category(ctx.request))
        .collect()
}

fn next_page_request(ctx: &PageContext<'_>) -> Option<Request> {
    let url = ctx.site.next_page_link(ctx.document, ctx.page_url)?;
    let request = Request::new(url, Label::PaginatedPage).ok()?;
    (request.unique_key() != ctx.request.unique_key())
        .then(|| request.inherit_category(ctx.request))
}

/// Validates raw products into candidates, counting those without a price
fn collect_products(ctx: &PageContext<'_>, raw: Vec<RawProduct>, output: &mut HandlerOutput) {
    if raw.is_empty() {
        return;
    }

    let breadcrumbs = ctx.site.breadcrumbs(ctx.document);
    let fallback = breadcrumbs.as_deref().or(ctx.request.category());

    for product in raw {
        match CandidateProduct::from_raw(
            product,
            ctx.page_url,
            ctx.site.default_currency(),
            fallback,
        ) {
            Some(candidate) => output.products.push(candidate),
            None => output.skipped_no_price += 1,
        }
    }
}

/// ROOT: enqueue every top-level category
pub fn handle_root(ctx: &PageContext<'_>) -> HandlerOutput {
    let links = ctx.site.category_links(ctx.document, ctx.page_url);
    let normal = link_requests(links, Label::Category);
    debug!("Found {} categories on {}", normal.len(), ctx.page_url);

    HandlerOutput {
        normal,
        ..HandlerOutput::default()
    }
}

/// CATEGORY and SUBCATEGORY: subcategories, pagination, product links and
/// the products listed on the page itself
pub fn handle_listing(ctx: &PageContext<'_>) -> HandlerOutput {
    let mut output = HandlerOutput::default();

    let subcategories =
        subcategory_requests(ctx.site.subcategory_links(ctx.document, ctx.page_url));
    debug!(
        "Found {} subcategories on {}",
        subcategories.len(),
        ctx.page_url
    );
    output.forefront.extend(subcategories);

    match ctx.site.pagination_strategy() {
        PaginationStrategy::PageCount => {
            let cells = ctx.site.page_index_cells(ctx.document);
            match page_count(&cells) {
                PageCount::SinglePage => {}
                PageCount::Pages(last) => {
                    let pages =
                        pagination_requests(ctx.request, last, ctx.site.page_url_template());
                    debug!("Found {} pagination pages on {}", pages.len(), ctx.page_url);
                    output.forefront.extend(pages);
                }
                PageCount::Unparseable(cell) => {
                    warn!(
                        "Could not read last page number '{}' on {}",
                        cell, ctx.page_url
                    );
                    output.pagination_unparsed = true;
                }
            }
        }
        PaginationStrategy::NextLink => {
            output.forefront.extend(next_page_request(ctx));
        }
    }

    output.normal.extend(product_detail_requests(ctx));

    let raw = ctx.site.listing_products(ctx.document, ctx.page_url);
    collect_products(ctx, raw, &mut output);
    output
}

/// PAGINATED_PAGE: products and product links; with next-link pagination
/// also the one successor page
pub fn handle_paginated_page(ctx: &PageContext<'_>) -> HandlerOutput {
    let mut output = HandlerOutput::default();

    if ctx.site.pagination_strategy() == PaginationStrategy::NextLink {
        output.forefront.extend(next_page_request(ctx));
    }

    output.normal.extend(product_detail_requests(ctx));

    let raw = ctx.site.listing_products(ctx.document, ctx.page_url);
    collect_products(ctx, raw, &mut output);
    output
}

/// PRODUCT_DETAIL: the single product described by the page
pub fn handle_product_detail(ctx: &PageContext<'_>) -> HandlerOutput {
    let mut output = HandlerOutput::default();

    match ctx.site.detail_product(ctx.document, ctx.page_url) {
        Some(mut product) => {
            if product.url.is_none() {
                product.url = Some(ctx.request.url().clone());
            }
            collect_products(ctx, vec![product], &mut output);
        }
        None => debug!("No product found on {}", ctx.page_url),
    }

    output
}
