//! Label router: dispatches a parsed page to the handler registered for its label

use crate::crawler::handlers;
use crate::crawler::request::{Label, Request};
use crate::site::{CandidateProduct, SiteExtractor};
use crate::PricewatchError;
use scraper::Html;
use std::collections::HashMap;
use url::Url;

/// Everything a handler may look at
///
/// Borrowed for the duration of one synchronous handler call.
pub struct PageContext<'a> {
    pub site: &'a dyn SiteExtractor,
    pub document: &'a Html,
    /// Final URL of the fetched page, after redirects
    pub page_url: &'a Url,
    pub request: &'a Request,
}

/// What a handler produced for one page
#[derive(Debug, Default)]
pub struct HandlerOutput {
    /// Requests for the priority tier
    pub forefront: Vec<Request>,
    /// Requests for the normal tier
    pub normal: Vec<Request>,
    /// Validated products, not yet deduplicated
    pub products: Vec<CandidateProduct>,
    /// Raw products dropped for lack of a usable price
    pub skipped_no_price: u64,
    /// The page index was present but its last page could not be read
    pub pagination_unparsed: bool,
}

/// A page handler
pub type Handler = fn(&PageContext<'_>) -> HandlerOutput;

/// Table from label to handler
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<Label, Handler>,
}

impl Router {
    /// Creates an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with the default handler for every label
    pub fn standard() -> Self {
        let mut router = Self::new();
        router.register(Label::Root, handlers::handle_root);
        router.register(Label::Category, handlers::handle_listing);
        router.register(Label::Subcategory, handlers::handle_listing);
        router.register(Label::PaginatedPage, handlers::handle_paginated_page);
        router.register(Label::ProductDetail, handlers::handle_product_detail);
        router
    }

    /// Registers `handler` for `label`, replacing any previous handler
    pub fn register(&mut self, label: Label, handler: Handler) -> &mut Self {
        self.routes.insert(label, handler);
        self
    }

    #[cfg(test)]
    pub fn handles(&self, label: Label) -> bool {
        self.routes.contains_key(&label)
    }

    /// Runs the handler registered for the request's label
    ///
    /// # Returns
    ///
    /// * `Ok(HandlerOutput)` - The handler's complete output
    /// * `Err(PricewatchError::UnroutableLabel)` - No handler is registered
    pub fn route(&self, ctx: &PageContext<'_>) -> Result<HandlerOutput, PricewatchError> {
        let label = ctx.request.label();
        let handler = self
            .routes
            .get(&label)
            .ok_or(PricewatchError::UnroutableLabel(label))?;
        Ok(handler(ctx))
    }
}
