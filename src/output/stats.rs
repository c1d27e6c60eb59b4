//! Statistics from the run database
//!
//! This module rebuilds run summaries from persisted state and prints them
//! for the `--stats` mode.

use crate::output::traits::RunSummary;
use crate::storage::Storage;
use crate::PricewatchError;

/// Loads the summary of the latest run with the given key
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `run_key` - Configured run name
///
/// # Returns
///
/// * `Ok(Some(RunSummary))` - Summary of the latest run
/// * `Ok(None)` - No run with that key exists
/// * `Err(PricewatchError)` - Failed to query storage
pub fn load_run_summary(
    storage: &dyn Storage,
    run_key: &str,
) -> Result<Option<RunSummary>, PricewatchError> {
    let run = match storage.get_latest_run(run_key)? {
        Some(run) => run,
        None => return Ok(None),
    };

    let counters = storage.load_stats(run.id)?;
    let (pending, _) = storage.count_frontier(run.id)?;

    let mut summary = RunSummary::from_run(&run, &counters);
    summary.ledger_size = storage.load_ledger(run.id)?.len() as u64;
    summary.frontier_pending = pending;

    Ok(Some(summary))
}

/// Prints a run summary to stdout
pub fn print_statistics(summary: &RunSummary) {
    println!("=== Run Statistics: {} ===\n", summary.run_key);

    println!("Run:");
    println!("  ID: {}", summary.run_id);
    println!("  Mode: {}", summary.mode);
    println!("  Status: {}", summary.status);
    println!("  Started: {}", summary.started_at);
    if let Some(finished) = &summary.finished_at {
        println!("  Finished: {}", finished);
    }
    if let Some(duration) = summary.duration_seconds {
        println!("  Duration: {}s", duration);
    }
    println!();

    println!("Crawl:");
    println!("  URLs seen: {}", summary.urls_seen);
    println!("  Listing pages: {}", summary.pages);
    println!("  Requests handled: {}", summary.requests);
    println!("  Failed requests: {}", summary.failed);
    println!("  Left in frontier: {}", summary.frontier_pending);
    println!();

    println!("Products:");
    println!("  Items found: {}", summary.items_found);
    println!(
        "  Duplicates: {} ({:.1}%)",
        summary.items_duplicate,
        summary.duplicate_rate()
    );
    println!("  Without price: {}", summary.items_no_price);
    println!("  Sink failures: {}", summary.sink_failed);
    println!("  Ledger size: {}", summary.ledger_size);
    println!();

    if summary.pagination_unparsed > 0 {
        println!(
            "Warning: {} page indexes could not be read",
            summary.pagination_unparsed
        );
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} requests handled)",
        summary.success_rate(),
        summary.requests,
        summary.requests + summary.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::collections::BTreeMap;

    #[test]
    fn test_load_summary_for_unknown_key() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(load_run_summary(&storage, "nothing").unwrap().is_none());
    }

    #[test]
    fn test_load_summary_of_latest_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let old = storage.create_run("shop", "full", "h").unwrap();
        let run_id = storage.create_run("shop", "test", "h").unwrap();

        let mut counters = BTreeMap::new();
        counters.insert("items".to_string(), 2);
        storage.save_stats(old, &counters).unwrap();
        counters.insert("items".to_string(), 5);
        storage.save_stats(run_id, &counters).unwrap();
        storage
            .save_ledger_keys(run_id, &["a".to_string(), "b".to_string()])
            .unwrap();

        let summary = load_run_summary(&storage, "shop").unwrap().unwrap();
        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.mode, "test");
        assert_eq!(summary.items_found, 5);
        assert_eq!(summary.ledger_size, 2);
        assert_eq!(summary.frontier_pending, 0);
    }
}
