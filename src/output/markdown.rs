//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of a run:
//! run metadata, counters and derived rates.

use crate::output::traits::{OutputResult, RunSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of a run
///
/// # Arguments
///
/// * `summary` - The run summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Pricewatch Run Summary: {}\n\n", summary.run_key));

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Mode**: {}\n", summary.mode));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if !summary.phase.is_empty() {
        md.push_str(&format!("- **Phase**: {}\n", summary.phase));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Products
    md.push_str("## Products\n\n");
    md.push_str("| Counter | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Items found | {} |\n", summary.items_found));
    md.push_str(&format!("| Duplicates | {} |\n", summary.items_duplicate));
    md.push_str(&format!("| Without price | {} |\n", summary.items_no_price));
    md.push_str(&format!("| Sink failures | {} |\n", summary.sink_failed));
    md.push_str(&format!(
        "| Ledger size | {} |\n\n",
        summary.ledger_size
    ));
    md.push_str(&format!(
        "- **Duplicate Rate**: {:.2}%\n\n",
        summary.duplicate_rate()
    ));

    // Crawl
    md.push_str("## Crawl\n\n");
    md.push_str("| Counter | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| URLs seen | {} |\n", summary.urls_seen));
    md.push_str(&format!("| Listing pages | {} |\n", summary.pages));
    md.push_str(&format!("| Requests handled | {} |\n", summary.requests));
    md.push_str(&format!("| Failed requests | {} |\n", summary.failed));
    md.push_str(&format!(
        "| Unparsed page indexes | {} |\n",
        summary.pagination_unparsed
    ));
    md.push_str(&format!(
        "| Left in frontier | {} |\n\n",
        summary.frontier_pending
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        summary.success_rate()
    ));

    if summary.failed > 0 || summary.sink_failed > 0 || summary.pagination_unparsed > 0 {
        md.push_str("\n## Warnings\n\n");
        if summary.failed > 0 {
            md.push_str(&format!(
                "- {} requests were dropped after retries\n",
                summary.failed
            ));
        }
        if summary.sink_failed > 0 {
            md.push_str(&format!(
                "- {} product batches could not be recorded\n",
                summary.sink_failed
            ));
        }
        if summary.pagination_unparsed > 0 {
            md.push_str(&format!(
                "- {} page indexes could not be read; pagination selectors may be stale\n",
                summary.pagination_unparsed
            ));
        }
    }

    md
}
