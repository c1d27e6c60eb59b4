//! Output traits and types
//!
//! This module defines the product sink interface and the run summary
//! produced when a run is finalized.

use crate::site::CandidateProduct;
use crate::state::Counter;
use crate::storage::RunRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Errors reported by a product sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink rejected batch: {0}")]
    Rejected(String),

    #[error("Sink storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Destination for products accepted by the dedup ledger
///
/// Called from worker tasks with each page's accepted batch. A failure is
/// counted and logged by the caller; the batch is not retried.
pub trait ProductSink: Send + Sync {
    /// Records a batch of accepted products
    ///
    /// # Returns
    ///
    /// The number of products actually written
    fn record_products(
        &self,
        run_id: i64,
        products: &[CandidateProduct],
    ) -> Result<usize, SinkError>;
}

/// Summary of a finished (or inspected) run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    // Run metadata
    pub run_id: i64,
    pub run_key: String,
    pub mode: String,
    pub status: String,
    pub phase: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub config_hash: String,

    // Counters
    pub urls_seen: u64,
    pub pages: u64,
    pub requests: u64,
    pub items_found: u64,
    pub items_duplicate: u64,
    pub items_no_price: u64,
    pub pagination_unparsed: u64,
    pub failed: u64,
    pub sink_failed: u64,

    // State sizes
    pub ledger_size: u64,
    pub frontier_pending: u64,
}

impl RunSummary {
    /// Builds a summary from a run row and its counter snapshot
    ///
    /// Missing counters read as zero.
    pub fn from_run(run: &RunRecord, counters: &BTreeMap<String, u64>) -> Self {
        let get = |c: Counter| counters.get(c.as_str()).copied().unwrap_or(0);

        Self {
            run_id: run.id,
            run_key: run.run_key.clone(),
            mode: run.mode.clone(),
            status: run.status.to_db_string().to_string(),
            phase: String::new(),
            started_at: run.started_at.clone(),
            finished_at: run.finished_at.clone(),
            duration_seconds: duration_seconds(&run.started_at, run.finished_at.as_deref()),
            config_hash: run.config_hash.clone(),
            urls_seen: get(Counter::Urls),
            pages: get(Counter::Pages),
            requests: get(Counter::Requests),
            items_found: get(Counter::Items),
            items_duplicate: get(Counter::ItemsDuplicate),
            items_no_price: get(Counter::ItemsNoPrice),
            pagination_unparsed: get(Counter::PaginationUnparsed),
            failed: get(Counter::Failed),
            sink_failed: get(Counter::SinkFailed),
            ledger_size: 0,
            frontier_pending: 0,
        }
    }

    /// Share of handled requests that did not fail, as a percentage
    pub fn success_rate(&self) -> f64 {
        let attempted = self.requests + self.failed;
        if attempted == 0 {
            return 0.0;
        }
        (self.requests as f64 / attempted as f64) * 100.0
    }

    /// Share of accepted-or-rejected candidates that were duplicates
    pub fn duplicate_rate(&self) -> f64 {
        let seen = self.items_found + self.items_duplicate;
        if seen == 0 {
            return 0.0;
        }
        (self.items_duplicate as f64 / seen as f64) * 100.0
    }
}

fn duration_seconds(started_at: &str, finished_at: Option<&str>) -> Option<u64> {
    let started = started_at.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
    let finished = finished_at?.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
    Some((finished - started).num_seconds().max(0) as u64)
}
