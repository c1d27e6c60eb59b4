//! Output module for run summaries and products
//!
//! This module handles:
//! - Recording accepted products through a `ProductSink`
//! - Generating markdown summaries of a run
//! - Printing statistics and exporting products as JSON lines

mod export;
mod markdown;
mod sqlite_output;
pub mod stats;
mod traits;

pub use export::{export_products, write_products};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sqlite_output::SqliteProductSink;
pub use stats::{load_run_summary, print_statistics};
pub use traits::{OutputError, OutputResult, ProductSink, RunSummary, SinkError};
