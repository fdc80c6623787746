use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::RankingOptions;
use crate::hidden::HiddenSet;
use crate::model::{Item, ItemKind};
use crate::stores::{load_entry, save_entry, KeyValueStore, StoreResult};

use super::group::GroupMode;
use super::{days_since_activity, RankedItem};

pub const FILTER_STATE_KEY: &str = "filterState";
pub const SEARCH_TEXT_KEY: &str = "searchText";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortKey {
    Frequency,
    #[default]
    Recency,
}

/// Every toggle the user can flip; persisted verbatim between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterState {
    pub show_bookmarks: bool,
    pub show_history: bool,
    pub show_frequent: bool,
    pub show_recent: bool,
    pub time_of_day: bool,
    pub time_window_minutes: u32,
    pub group_by: GroupMode,
    pub sort_by: SortKey,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            show_bookmarks: true,
            show_history: true,
            show_frequent: false,
            show_recent: false,
            time_of_day: false,
            time_window_minutes: 60,
            group_by: GroupMode::None,
            sort_by: SortKey::Recency,
        }
    }
}

impl FilterState {
    pub fn load<K: KeyValueStore + ?Sized>(store: &K) -> StoreResult<Self> {
        Ok(load_entry(store, FILTER_STATE_KEY)?.unwrap_or_default())
    }

    pub fn save<K: KeyValueStore + ?Sized>(&self, store: &K) -> StoreResult<()> {
        save_entry(store, FILTER_STATE_KEY, self)
    }
}

/// All filter stages, AND-combined: suppression, type toggles, frequency/recency
/// class, then free-text search.
pub fn passes_filters(
    item: &Item,
    state: &FilterState,
    hidden: &HiddenSet,
    query: &str,
    options: &RankingOptions,
    now: i64,
) -> bool {
    !hidden.hides(item)
        && passes_type(item, state)
        && passes_class(item, state, options, now)
        && matches_query(item, query)
}

fn passes_type(item: &Item, state: &FilterState) -> bool {
    match item.kind {
        ItemKind::Folder => true,
        ItemKind::Bookmark => state.show_bookmarks,
        ItemKind::History => state.show_history,
    }
}

fn passes_class(item: &Item, state: &FilterState, options: &RankingOptions, now: i64) -> bool {
    if item.is_folder() {
        return true;
    }
    let visits = item.effective_visit_count();
    let frequent = visits >= options.frequent_visit_threshold;
    let recent = days_since_activity(item, now) < options.recent_days as f64;
    match (state.show_frequent, state.show_recent) {
        (true, true) => frequent || recent,
        (true, false) => frequent,
        (false, true) => recent,
        (false, false) => visits > 0,
    }
}

/// Case-insensitive substring match on title, URL and path; blank queries match everything.
pub(crate) fn matches_query(item: &Item, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    item.title.to_lowercase().contains(&needle)
        || item
            .url
            .as_deref()
            .map_or(false, |url| url.to_lowercase().contains(&needle))
        || item.path.to_lowercase().contains(&needle)
}

/// Folders last; otherwise primary score, secondary score (both descending), then title.
pub fn sort_ranked(items: &mut [RankedItem], sort_by: SortKey) {
    items.sort_by(|a, b| compare(a, b, sort_by));
}

fn compare(a: &RankedItem, b: &RankedItem, sort_by: SortKey) -> Ordering {
    let (primary, secondary): (fn(&RankedItem) -> u32, fn(&RankedItem) -> u32) = match sort_by {
        SortKey::Frequency => (|r| r.scores.frequency, |r| r.scores.recency),
        SortKey::Recency => (|r| r.scores.recency, |r| r.scores.frequency),
    };
    a.item
        .is_folder()
        .cmp(&b.item.is_folder())
        .then_with(|| primary(b).cmp(&primary(a)))
        .then_with(|| secondary(b).cmp(&secondary(a)))
        .then_with(|| compare_titles(&a.item.title, &b.item.title))
}

/// Case-folded order first, so "apple" precedes "Banana"; raw order breaks the remaining ties.
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hidden::SuppressionKey;
    use crate::model::MILLIS_PER_DAY;
    use crate::ranking::score_item;
    use crate::ranking::tests::{folder, visited, NOW};

    fn rank(items: Vec<Item>) -> Vec<RankedItem> {
        items
            .into_iter()
            .map(|item| RankedItem {
                scores: score_item(&item, NOW, &RankingOptions::default()),
                item,
                time_match: None,
            })
            .collect()
    }

    fn titles(items: &[RankedItem]) -> Vec<&str> {
        items.iter().map(|r| r.item.title.as_str()).collect()
    }

    fn passes(item: &Item, state: &FilterState) -> bool {
        passes_filters(item, state, &HiddenSet::default(), "", &RankingOptions::default(), NOW)
    }

    #[test]
    fn primary_sort_key_flips_the_scenario_order() {
        let a = visited("https://a.example/", "A", 20, Some(NOW - 2 * MILLIS_PER_DAY));
        let b = visited("https://b.example/", "B", 5, Some(NOW - MILLIS_PER_DAY / 2));
        let mut ranked = rank(vec![b, a]);

        sort_ranked(&mut ranked, SortKey::Frequency);
        assert_eq!(titles(&ranked), vec!["A", "B"]);
        assert_eq!(ranked[0].scores.frequency, 40);
        assert_eq!(ranked[1].scores.frequency, 10);

        sort_ranked(&mut ranked, SortKey::Recency);
        assert_eq!(titles(&ranked), vec!["B", "A"]);
        assert_eq!(ranked[0].scores.recency, 100);
        assert_eq!(ranked[1].scores.recency, 80);
    }

    #[test]
    fn folders_sort_last_and_ties_fall_to_title() {
        let mut ranked = rank(vec![
            folder("9", "Aardvark folder"),
            visited("https://z.example/", "Zulu", 1, Some(NOW)),
            visited("https://y.example/", "Yankee", 1, Some(NOW)),
            visited("https://x.example/", "old", 0, None),
        ]);
        sort_ranked(&mut ranked, SortKey::Frequency);
        assert_eq!(titles(&ranked), vec!["Yankee", "Zulu", "old", "Aardvark folder"]);
    }

    #[test]
    fn title_ties_ignore_case() {
        let mut ranked = rank(vec![
            visited("https://b.example/", "Banana", 1, Some(NOW)),
            visited("https://a.example/", "apple", 1, Some(NOW)),
            visited("https://c.example/", "Apple", 1, Some(NOW)),
            visited("https://d.example/", "cherry", 1, Some(NOW)),
        ]);
        sort_ranked(&mut ranked, SortKey::Recency);
        assert_eq!(titles(&ranked), vec!["Apple", "apple", "Banana", "cherry"]);
    }

    #[test]
    fn type_toggles_never_drop_folders() {
        let state = FilterState {
            show_bookmarks: false,
            show_history: false,
            ..FilterState::default()
        };
        let mut bookmark = visited("https://b.example/", "B", 3, Some(NOW));
        bookmark.kind = ItemKind::Bookmark;
        assert!(!passes(&bookmark, &state));
        assert!(!passes(&visited("https://h.example/", "H", 3, Some(NOW)), &state));
        assert!(passes(&folder("1", "F"), &state));
    }

    #[test]
    fn class_toggles_select_frequent_or_recent() {
        let frequent_old = visited("https://f.example/", "F", 12, Some(NOW - 60 * MILLIS_PER_DAY));
        let rare_recent = visited("https://r.example/", "R", 1, Some(NOW - MILLIS_PER_DAY));
        let never = visited("https://n.example/", "N", 0, Some(NOW));

        let frequent_only = FilterState {
            show_frequent: true,
            ..FilterState::default()
        };
        assert!(passes(&frequent_old, &frequent_only));
        assert!(!passes(&rare_recent, &frequent_only));

        let recent_only = FilterState {
            show_recent: true,
            ..FilterState::default()
        };
        assert!(!passes(&frequent_old, &recent_only));
        assert!(passes(&rare_recent, &recent_only));

        let both = FilterState {
            show_frequent: true,
            show_recent: true,
            ..FilterState::default()
        };
        assert!(passes(&frequent_old, &both));
        assert!(passes(&rare_recent, &both));

        let neither = FilterState::default();
        assert!(passes(&rare_recent, &neither));
        assert!(!passes(&never, &neither));
        assert!(passes(&folder("1", "F"), &neither));
    }

    #[test]
    fn search_matches_title_url_and_path_case_insensitively() {
        let mut item = visited("https://docs.rs/serde", "Serde docs", 1, Some(NOW));
        item.path = "Work > Rust".into();
        assert!(matches_query(&item, "SERDE"));
        assert!(matches_query(&item, "docs.rs"));
        assert!(matches_query(&item, "rust"));
        assert!(matches_query(&item, "   "));
        assert!(!matches_query(&item, "python"));
    }

    #[test]
    fn hidden_items_are_dropped() {
        let item = visited("https://a.example/x", "A", 3, Some(NOW));
        let mut hidden = HiddenSet::default();
        hidden.insert(SuppressionKey::Domain("a.example".into()));
        let state = FilterState::default();
        assert!(!passes_filters(&item, &state, &hidden, "", &RankingOptions::default(), NOW));
    }
}
