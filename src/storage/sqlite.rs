//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{FrontierRecord, Label, Request, Tier};
use crate::site::CandidateProduct;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ProductRecord, RunRecord, RunStatus};
use crate::PricewatchError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

const FRONTIER_PENDING: &str = "pending";
const FRONTIER_DONE: &str = "done";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(PricewatchError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, PricewatchError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, PricewatchError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        run_key: row.get(1)?,
        mode: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        config_hash: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Running),
    })
}

const RUN_COLUMNS: &str =
    "id, run_key, mode, started_at, finished_at, config_hash, status";

/// Raw frontier row, decoded outside the rusqlite row closure
struct FrontierRow {
    url: String,
    label: String,
    metadata: String,
    tier: String,
    seq: i64,
    status: String,
}

impl FrontierRow {
    fn decode(self) -> StorageResult<FrontierRecord> {
        let label = Label::from_db_string(&self.label)
            .ok_or_else(|| StorageError::Serialization(format!("unknown label '{}'", self.label)))?;
        let tier = Tier::from_db_string(&self.tier)
            .ok_or_else(|| StorageError::Serialization(format!("unknown tier '{}'", self.tier)))?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)
            .map_err(|e| StorageError::Serialization(format!("metadata of {}: {}", self.url, e)))?;

        let request = metadata.into_iter().fold(
            Request::parse(&self.url, label)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            |request, (key, value)| request.with_metadata(key, value),
        );

        Ok(FrontierRecord {
            request,
            tier,
            seq: self.seq as u64,
            completed: self.status == FRONTIER_DONE,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, run_key: &str, mode: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (run_key, mode, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_key,
                mode,
                now,
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, run_key: &str) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM runs WHERE run_key = ?1 ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![run_key],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Frontier =====

    fn save_frontier(&mut self, run_id: i64, records: &[FrontierRecord]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM frontier WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO frontier (run_id, url, label, metadata, tier, seq, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                let metadata = serde_json::to_string(record.request.metadata())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                stmt.execute(params![
                    run_id,
                    record.request.unique_key(),
                    record.request.label().as_str(),
                    metadata,
                    record.tier.to_db_string(),
                    record.seq as i64,
                    if record.completed {
                        FRONTIER_DONE
                    } else {
                        FRONTIER_PENDING
                    },
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<FrontierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, label, metadata, tier, seq, status FROM frontier
             WHERE run_id = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(FrontierRow {
                    url: row.get(0)?,
                    label: row.get(1)?,
                    metadata: row.get(2)?,
                    tier: row.get(3)?,
                    seq: row.get(4)?,
                    status: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(FrontierRow::decode).collect()
    }

    fn count_frontier(&self, run_id: i64) -> StorageResult<(u64, u64)> {
        let count = |status: &str| -> StorageResult<u64> {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM frontier WHERE run_id = ?1 AND status = ?2",
                params![run_id, status],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };
        Ok((count(FRONTIER_PENDING)?, count(FRONTIER_DONE)?))
    }

    // ===== Ledger =====

    fn save_ledger_keys(&mut self, run_id: i64, keys: &[String]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ledger (run_id, item_key, recorded_at) VALUES (?1, ?2, ?3)",
            )?;
            for key in keys {
                stmt.execute(params![run_id, key, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_ledger(&self, run_id: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_key FROM ledger WHERE run_id = ?1")?;

        let keys = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    // ===== Statistics =====

    fn save_stats(&mut self, run_id: i64, stats: &BTreeMap<String, u64>) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO run_stats (run_id, counter, value) VALUES (?1, ?2, ?3)",
            )?;
            for (counter, value) in stats {
                stmt.execute(params![run_id, counter, *value as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_stats(&self, run_id: i64) -> StorageResult<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT counter, value FROM run_stats WHERE run_id = ?1")?;

        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = BTreeMap::new();
        for row in rows {
            let (counter, value) = row?;
            stats.insert(counter, value.max(0) as u64);
        }

        Ok(stats)
    }

    // ===== Products =====

    fn insert_products(
        &mut self,
        run_id: i64,
        products: &[CandidateProduct],
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO products
                 (run_id, item_key, item_id, item_name, item_url, current_price, original_price,
                  discounted, currency, category, img, in_stock, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for product in products {
                inserted += stmt.execute(params![
                    run_id,
                    product.ledger_key(),
                    product.item_id(),
                    product.item_name(),
                    product.item_url().as_str(),
                    product.current_price(),
                    product.original_price(),
                    product.discounted(),
                    product.currency(),
                    product.category(),
                    product.img(),
                    product.in_stock(),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn count_products(&self, run_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn load_products(&self, run_id: i64) -> StorageResult<Vec<ProductRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_key, item_id, item_name, item_url, current_price, original_price,
                    discounted, currency, category, img, in_stock, recorded_at
             FROM products WHERE run_id = ?1 ORDER BY id ASC",
        )?;

        let products = stmt
            .query_map(params![run_id], |row| {
                Ok(ProductRecord {
                    item_key: row.get(0)?,
                    item_id: row.get(1)?,
                    item_name: row.get(2)?,
                    item_url: row.get(3)?,
                    current_price: row.get(4)?,
                    original_price: row.get(5)?,
                    discounted: row.get(6)?,
                    currency: row.get(7)?,
                    category: row.get(8)?,
                    img: row.get(9)?,
                    in_stock: row.get(10)?,
                    recorded_at: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::RawProduct;
    use url::Url;

    fn product(id: &str, price: f64) -> CandidateProduct {
        let page = Url::parse("https://shop.example.com/leky").unwrap();
        CandidateProduct::from_raw(
            RawProduct {
                id: Some(id.to_string()),
                name: Some(format!("Product {}", id)),
                url: Some(Url::parse(&format!("https://shop.example.com/p/{}", id)).unwrap()),
                current_price: Some(price),
                original_price: Some(price * 2.0),
                in_stock: Some(true),
                ..RawProduct::default()
            },
            &page,
            "CZK",
            Some("Léky"),
        )
        .unwrap()
    }

    fn record(path: &str, label: Label, tier: Tier, seq: u64, completed: bool) -> FrontierRecord {
        FrontierRecord {
            request: Request::parse(&format!("https://shop.example.com{}", path), label)
                .unwrap()
                .with_metadata("category", "Léky"),
            tier,
            seq,
            completed,
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_and_get_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("lekarna-cz", "full", "hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.run_key, "lekarna-cz");
        assert_eq!(run.mode, "full");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
    }

    #[test]
    fn test_latest_run_is_per_key() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a1 = storage.create_run("a", "full", "h").unwrap();
        let b1 = storage.create_run("b", "full", "h").unwrap();
        let a2 = storage.create_run("a", "test", "h").unwrap();

        assert_eq!(storage.get_latest_run("a").unwrap().unwrap().id, a2);
        assert_eq!(storage.get_latest_run("b").unwrap().unwrap().id, b1);
        assert!(storage.get_latest_run("c").unwrap().is_none());
        assert_ne!(a1, a2);
    }

    #[test]
    fn test_finish_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();

        storage.finish_run(run_id, RunStatus::Interrupted).unwrap();

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert!(run.finished_at.is_some());
        assert!(storage.finish_run(999, RunStatus::Completed).is_err());
    }

    #[test]
    fn test_frontier_snapshot_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();

        let records = vec![
            record("/leky", Label::Category, Tier::Normal, 0, true),
            record("/leky/bolest", Label::Subcategory, Tier::Forefront, 1, false),
            record("/p/1", Label::ProductDetail, Tier::Normal, 2, false),
        ];
        storage.save_frontier(run_id, &records).unwrap();

        let loaded = storage.load_frontier(run_id).unwrap();
        assert_eq!(loaded, records);
        assert_eq!(storage.count_frontier(run_id).unwrap(), (2, 1));
    }

    #[test]
    fn test_save_frontier_replaces_previous_snapshot() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();

        storage
            .save_frontier(
                run_id,
                &[record("/old", Label::Category, Tier::Normal, 0, false)],
            )
            .unwrap();
        storage
            .save_frontier(
                run_id,
                &[record("/new", Label::Category, Tier::Normal, 1, true)],
            )
            .unwrap();

        let loaded = storage.load_frontier(run_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].request.url().path(), "/new");
    }

    #[test]
    fn test_corrupt_frontier_row_is_reported() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO frontier (run_id, url, label, metadata, tier, seq, status)
                 VALUES (?1, 'https://shop.example.com/x', 'NOPE', '{}', 'normal', 0, 'pending')",
                params![run_id],
            )
            .unwrap();

        assert!(matches!(
            storage.load_frontier(run_id),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_ledger_keys_are_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();
        let other = storage.create_run("b", "full", "h").unwrap();

        storage
            .save_ledger_keys(run_id, &["1".to_string(), "2".to_string()])
            .unwrap();
        storage
            .save_ledger_keys(run_id, &["2".to_string(), "3".to_string()])
            .unwrap();

        let mut keys = storage.load_ledger(run_id).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1", "2", "3"]);
        assert!(storage.load_ledger(other).unwrap().is_empty());
    }

    #[test]
    fn test_stats_roundtrip_and_overwrite() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();

        let mut stats = BTreeMap::new();
        stats.insert("items".to_string(), 3);
        stats.insert("pages".to_string(), 1);
        storage.save_stats(run_id, &stats).unwrap();

        stats.insert("items".to_string(), 7);
        storage.save_stats(run_id, &stats).unwrap();

        let loaded = storage.load_stats(run_id).unwrap();
        assert_eq!(loaded["items"], 7);
        assert_eq!(loaded["pages"], 1);
    }

    #[test]
    fn test_insert_products_skips_recorded_keys() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("a", "full", "h").unwrap();

        let inserted = storage
            .insert_products(run_id, &[product("1", 10.0), product("2", 20.0)])
            .unwrap();
        assert_eq!(inserted, 2);

        let inserted = storage
            .insert_products(run_id, &[product("2", 20.0), product("3", 30.0)])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(storage.count_products(run_id).unwrap(), 3);

        let products = storage.load_products(run_id).unwrap();
        assert_eq!(products[0].item_id.as_deref(), Some("1"));
        assert_eq!(products[0].original_price, Some(20.0));
        assert!(products[0].discounted);
        assert_eq!(products[0].in_stock, Some(true));
        assert_eq!(products[2].category.as_deref(), Some("Léky"));
    }
}
