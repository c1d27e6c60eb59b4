//! SQLite-based product sink
//!
//! This module provides a product sink that records accepted products
//! directly to the SQLite storage backend.

use crate::output::traits::{ProductSink, SinkError};
use crate::site::CandidateProduct;
use crate::storage::SharedStorage;

/// SQLite-based product sink
///
/// Shares the storage backend with the coordinator, so products land in the
/// same database as the run's checkpoints.
pub struct SqliteProductSink {
    storage: SharedStorage,
}

impl SqliteProductSink {
    /// Creates a new SQLite product sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend to write to
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

impl ProductSink for SqliteProductSink {
    fn record_products(
        &self,
        run_id: i64,
        products: &[CandidateProduct],
    ) -> Result<usize, SinkError> {
        if products.is_empty() {
            return Ok(0);
        }

        let mut storage = self
            .storage
            .lock()
            .map_err(|e| SinkError::Rejected(format!("Failed to lock storage: {}", e)))?;

        Ok(storage.insert_products(run_id, products)?)
    }
}
