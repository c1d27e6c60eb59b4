//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::FrontierRecord;
use crate::site::CandidateProduct;
use crate::storage::{ProductRecord, RunRecord, RunStatus};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the coordinator and
/// the CLI reporting modes. Callers share one backend behind a mutex.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `run_key` - Configured run name
    /// * `mode` - Run mode name
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, run_key: &str, mode: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run with the given key
    fn get_latest_run(&self, run_key: &str) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Sets the final status and the finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Frontier =====

    /// Replaces the stored frontier snapshot of a run
    fn save_frontier(&mut self, run_id: i64, records: &[FrontierRecord]) -> StorageResult<()>;

    /// Loads the frontier snapshot of a run, in arrival order
    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<FrontierRecord>>;

    /// Counts snapshot entries as (pending, completed)
    fn count_frontier(&self, run_id: i64) -> StorageResult<(u64, u64)>;

    // ===== Ledger =====

    /// Appends ledger keys; keys already stored are ignored
    fn save_ledger_keys(&mut self, run_id: i64, keys: &[String]) -> StorageResult<()>;

    /// Loads every ledger key of a run
    fn load_ledger(&self, run_id: i64) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    /// Stores the current value of every counter
    fn save_stats(&mut self, run_id: i64, stats: &BTreeMap<String, u64>) -> StorageResult<()>;

    /// Loads the last stored counter values
    fn load_stats(&self, run_id: i64) -> StorageResult<BTreeMap<String, u64>>;

    // ===== Products =====

    /// Records products, skipping keys already recorded for the run
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted
    fn insert_products(&mut self, run_id: i64, products: &[CandidateProduct])
        -> StorageResult<usize>;

    /// Counts products recorded for a run
    fn count_products(&self, run_id: i64) -> StorageResult<u64>;

    /// Loads the products of a run in insertion order
    fn load_products(&self, run_id: i64) -> StorageResult<Vec<ProductRecord>>;
}
