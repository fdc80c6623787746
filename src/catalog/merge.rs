use std::collections::HashMap;

use indexmap::IndexMap;

use crate::model::{HistoryEntry, Item, ItemKind};
use crate::stores::HistoryStore;
use crate::usage::UsageMap;

/// Copies tracked usage onto the items it belongs to.
pub fn apply_usage(items: &mut [Item], usage: &UsageMap) {
    for item in items.iter_mut() {
        let Some(record) = item.id.bookmark_id().and_then(|id| usage.get(id)) else {
            continue;
        };
        item.use_count = record.use_count;
        item.last_used = Some(record.last_used);
    }
}

/// Attaches visit data from the history store to bookmarks without tracked usage.
/// Session-local only: nothing here is written back to the usage map.
pub fn enrich_with_history<H: HistoryStore + ?Sized>(items: &mut [Item], history: &H) {
    let mut enriched = 0usize;
    for item in items.iter_mut() {
        if item.kind != ItemKind::Bookmark || item.use_count > 0 {
            continue;
        }
        let Some(url) = item.url.as_deref() else {
            continue;
        };
        match visit_times(history, url) {
            Some(times) if !times.is_empty() => {
                item.last_visit_time = times.first().copied();
                item.visit_count = times.len() as u32;
                item.visits = times;
                enriched += 1;
            }
            _ => {}
        }
    }
    tracing::debug!(enriched, "bookmarks enriched with history");
}

/// Most recent visit to `url`, or `None` when there is none or the store fails.
pub fn last_visit_from_history<H: HistoryStore + ?Sized>(history: &H, url: &str) -> Option<i64> {
    visit_times(history, url).and_then(|times| times.first().copied())
}

/// Visit timestamps newest first; store faults are logged and yield `None`.
pub(crate) fn visit_times<H: HistoryStore + ?Sized>(history: &H, url: &str) -> Option<Vec<i64>> {
    match history.get_visits(url) {
        Ok(visits) => {
            let mut times: Vec<i64> = visits.into_iter().map(|visit| visit.visit_time).collect();
            times.sort_unstable_by(|a, b| b.cmp(a));
            Some(times)
        }
        Err(err) => {
            tracing::warn!(%url, error = %err, "failed to read visits");
            None
        }
    }
}

/// Unions flattened bookmarks with history entries so that every URL appears once.
///
/// Folders pass through untouched. A bookmarked URL found in history takes the
/// history visit data; history URLs without a bookmark become `History` items.
/// Repeated bookmarks of one URL collapse into the first one seen.
pub fn merge(bookmarks: Vec<Item>, history: &[HistoryEntry]) -> Vec<Item> {
    let mut by_url: HashMap<&str, &HistoryEntry> = HashMap::new();
    for entry in history {
        by_url
            .entry(entry.url.as_str())
            .and_modify(|existing| {
                if entry.visit_count > existing.visit_count {
                    *existing = entry;
                }
            })
            .or_insert(entry);
    }

    let mut folders = Vec::new();
    let mut merged: IndexMap<String, Item> = IndexMap::new();
    for mut item in bookmarks {
        let Some(url) = item.url.clone() else {
            folders.push(item);
            continue;
        };
        if let Some(entry) = by_url.get(url.as_str()) {
            item.visit_count = entry.visit_count;
            item.last_visit_time = entry.last_visit_time;
            if !entry.visits.is_empty() {
                item.visits = entry.visits.clone();
            }
        }
        match merged.get_mut(&url) {
            Some(first) => fold_duplicate(first, item),
            None => {
                merged.insert(url, item);
            }
        }
    }

    for entry in history {
        if !merged.contains_key(&entry.url) {
            merged.insert(entry.url.clone(), Item::history(by_url[entry.url.as_str()]));
        }
    }

    let mut out: Vec<Item> = Vec::with_capacity(folders.len() + merged.len());
    out.extend(merged.into_values());
    out.extend(folders);
    out
}

fn fold_duplicate(first: &mut Item, other: Item) {
    first.use_count = first.use_count.max(other.use_count);
    first.last_used = first.last_used.max(other.last_used);
    first.date_added = match (first.date_added, other.date_added) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::catalog::flatten::{flatten_tree, tests::sample_tree};
    use crate::model::ItemId;

    fn entry(url: &str, visit_count: u32, last: i64) -> HistoryEntry {
        HistoryEntry {
            url: url.into(),
            title: format!("title of {url}"),
            visit_count,
            last_visit_time: Some(last),
            visits: vec![last],
        }
    }

    #[test]
    fn bookmarked_and_visited_url_appears_once() {
        let mut bookmarks = flatten_tree(&sample_tree(), " > ");
        bookmarks.retain(|item| item.url.as_deref() != Some("https://news.example.com/"));
        bookmarks[2].url = Some("https://x.com/a".into());
        let items = merge(bookmarks, &[entry("https://x.com/a", 7, 99)]);

        let matching: Vec<_> = items
            .iter()
            .filter(|item| item.url.as_deref() == Some("https://x.com/a"))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].kind, ItemKind::Bookmark);
        assert_eq!(matching[0].visit_count, 7);
        assert_eq!(matching[0].last_visit_time, Some(99));
    }

    #[test]
    fn unbookmarked_history_becomes_synthetic_item() {
        let items = merge(
            flatten_tree(&sample_tree(), " > "),
            &[entry("https://only-history.example/", 3, 5)],
        );
        let synthetic = items
            .iter()
            .find(|item| item.kind == ItemKind::History)
            .expect("history item");
        assert_eq!(
            synthetic.id,
            ItemId::History("https://only-history.example/".into())
        );
        assert_eq!(synthetic.visit_count, 3);
    }

    #[test]
    fn urls_are_unique_and_folders_survive() {
        let mut bookmarks = flatten_tree(&sample_tree(), " > ");
        let mut dup = bookmarks[2].clone();
        dup.id = ItemId::Bookmark("50".into());
        dup.use_count = 4;
        bookmarks.push(dup);
        let history = [
            entry("https://docs.rs/", 2, 10),
            entry("https://docs.rs/", 9, 20),
            entry("https://h.example/", 1, 1),
        ];
        let items = merge(bookmarks, &history);

        let mut seen = HashSet::new();
        for url in items.iter().filter_map(|item| item.url.as_deref()) {
            assert!(seen.insert(url), "duplicate url {url}");
        }
        let docs = items
            .iter()
            .find(|item| item.url.as_deref() == Some("https://docs.rs/"))
            .expect("docs present");
        assert_eq!(docs.visit_count, 9);
        assert_eq!(docs.use_count, 4);
        assert_eq!(items.iter().filter(|item| item.is_folder()).count(), 3);
    }

    #[test]
    fn unvisited_bookmark_keeps_date_added() {
        let items = merge(flatten_tree(&sample_tree(), " > "), &[]);
        let docs = items
            .iter()
            .find(|item| item.url.as_deref() == Some("https://docs.rs/"))
            .expect("docs present");
        assert_eq!(docs.visit_count, 0);
        assert_eq!(docs.last_activity(), Some(2));
    }
}
