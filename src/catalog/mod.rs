//! Builds the rankable item list from the bookmark tree and visit history.

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::model::{HistoryEntry, Item};
use crate::stores::{BookmarkStore, HistoryStore};
use crate::usage::UsageMap;

mod flatten;
mod merge;

pub use flatten::flatten_tree;
pub use merge::{apply_usage, enrich_with_history, last_visit_from_history, merge};

/// Runs flatten, usage, enrichment and merge. Only a failure to read the
/// bookmark tree is an error; history faults degrade to "no history".
pub fn load_catalog<B, H>(
    bookmarks: &B,
    history: &H,
    usage: &UsageMap,
    config: &AppConfig,
    now: i64,
) -> Result<Vec<Item>>
where
    B: BookmarkStore + ?Sized,
    H: HistoryStore + ?Sized,
{
    let tree = bookmarks.get_tree().context("reading bookmark tree")?;
    let mut items = flatten_tree(&tree, &config.display.path_separator);
    tracing::debug!(count = items.len(), "flattened bookmark tree");

    apply_usage(&mut items, usage);
    enrich_with_history(&mut items, history);

    let start_time = now - config.history.lookback().whole_milliseconds() as i64;
    let entries = recent_history(history, config.history.max_results, start_time);
    let merged = merge(items, &entries);
    tracing::debug!(count = merged.len(), history = entries.len(), "merged catalog");
    Ok(merged)
}

fn recent_history<H: HistoryStore + ?Sized>(
    history: &H,
    max_results: usize,
    start_time: i64,
) -> Vec<HistoryEntry> {
    let mut entries = match history.search("", max_results, start_time) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "history search failed, continuing without history");
            return Vec::new();
        }
    };
    for entry in entries.iter_mut().filter(|entry| entry.visits.is_empty()) {
        if let Some(times) = merge::visit_times(history, &entry.url) {
            entry.visits = times;
        }
    }
    entries
}
