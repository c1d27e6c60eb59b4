//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Pricewatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs; run_key is the configured run name
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_key TEXT NOT NULL,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_key ON runs(run_key);

-- Frontier snapshot taken at the last checkpoint
CREATE TABLE IF NOT EXISTS frontier (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    label TEXT NOT NULL,
    metadata TEXT NOT NULL,
    tier TEXT NOT NULL,
    seq INTEGER NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (run_id, url)
);

CREATE INDEX IF NOT EXISTS idx_frontier_seq ON frontier(run_id, seq);

-- Product keys accepted by the dedup ledger
CREATE TABLE IF NOT EXISTS ledger (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    item_key TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (run_id, item_key)
);

-- Run counters
CREATE TABLE IF NOT EXISTS run_stats (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    counter TEXT NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (run_id, counter)
);

-- Products emitted by the run
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    item_key TEXT NOT NULL,
    item_id TEXT,
    item_name TEXT,
    item_url TEXT NOT NULL,
    current_price REAL NOT NULL,
    original_price REAL,
    discounted INTEGER NOT NULL,
    currency TEXT NOT NULL,
    category TEXT,
    img TEXT,
    in_stock INTEGER,
    recorded_at TEXT NOT NULL,
    UNIQUE(run_id, item_key)
);

CREATE INDEX IF NOT EXISTS idx_products_run ON products(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
