//! Run statistics
//!
//! Counters only ever increase. Every component that observes an event bumps
//! the matching counter; reads happen through `snapshot` for checkpoints and
//! the run summary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A named run counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    /// URLs newly added to the frontier
    Urls,
    /// Listing pages scheduled by discovery
    Pages,
    /// Requests fetched and handled
    Requests,
    /// Unique products accepted by the ledger
    Items,
    /// Products rejected because the ledger already held them
    ItemsDuplicate,
    /// Candidates dropped for lack of a usable price
    ItemsNoPrice,
    /// Page indexes whose last page number could not be read
    PaginationUnparsed,
    /// Requests dropped after exhausting retries
    Failed,
    /// Batches the product sink failed to record
    SinkFailed,
}

impl Counter {
    pub const ALL: [Counter; 9] = [
        Counter::Urls,
        Counter::Pages,
        Counter::Requests,
        Counter::Items,
        Counter::ItemsDuplicate,
        Counter::ItemsNoPrice,
        Counter::PaginationUnparsed,
        Counter::Failed,
        Counter::SinkFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urls => "urls",
            Self::Pages => "pages",
            Self::Requests => "requests",
            Self::Items => "items",
            Self::ItemsDuplicate => "items_duplicate",
            Self::ItemsNoPrice => "items_no_price",
            Self::PaginationUnparsed => "pagination_unparsed",
            Self::Failed => "failed",
            Self::SinkFailed => "sink_failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free accumulator for all run counters
#[derive(Debug, Default)]
pub struct Stats {
    values: [AtomicU64; Counter::ALL.len()],
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds stats from a persisted snapshot; unknown names are ignored
    pub fn restore(saved: &BTreeMap<String, u64>) -> Self {
        let stats = Self::new();
        for (name, value) in saved {
            if let Some(counter) = Counter::from_db_string(name) {
                stats.add(counter, *value);
            }
        }
        stats
    }

    pub fn inc(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        if n > 0 {
            self.values[counter.index()].fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Returns every counter by name, including zero counters
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        Counter::ALL
            .into_iter()
            .map(|c| (c.as_str().to_string(), self.get(c)))
            .collect()
    }
}
