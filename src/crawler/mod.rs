//! Crawler module for request processing
//!
//! This module contains the core crawling logic, including:
//! - Requests, labels and the two-tier frontier
//! - HTTP fetching with retry logic
//! - HTML parsing and label-routed page handlers
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod frontier;
pub mod handlers;
mod parser;
mod request;
mod router;

pub use coordinator::{seed_requests, Coordinator};
pub use fetcher::{build_http_client, user_agent_string, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use frontier::{Frontier, FrontierRecord, Tier};
pub use handlers::PageCount;
pub use parser::parse_document;
pub use request::{Label, Request, CATEGORY_KEY};
pub use router::{Handler, HandlerOutput, PageContext, Router};

pub use crate::output::RunSummary;
