//! Storage module for persisting run state
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run tracking and resumption support
//! - Frontier, ledger and stats checkpoints
//! - Emitted products

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::PricewatchError;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage backend shared between the coordinator, workers and sinks
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(PricewatchError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, PricewatchError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub run_key: String,
    pub mode: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if a later invocation should pick this run up again
    ///
    /// A run left in `running` was killed without draining.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}

/// A product row as stored, in export format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(skip)]
    pub item_key: String,
    pub item_id: Option<String>,
    pub item_name: Option<String>,
    pub item_url: String,
    pub current_price: f64,
    pub original_price: Option<f64>,
    pub discounted: bool,
    pub currency: String,
    pub category: Option<String>,
    pub img: Option<String>,
    pub in_stock: Option<bool>,
    pub recorded_at: String,
}
