//! Scoring, filtering, ordering and grouping of catalog items.
//!
//! Everything here is pure: [`compute_view`] takes the catalog plus the
//! session's filter state and returns ordered groups ready to render.

use crate::config::RankingOptions;
use crate::model::{Item, MILLIS_PER_DAY};

mod filter;
mod group;
mod time_of_day;
mod view;

pub use filter::{passes_filters, sort_ranked, FilterState, SortKey, FILTER_STATE_KEY, SEARCH_TEXT_KEY};
pub use group::{group_items, GroupKind, GroupMode, ViewGroup};
pub use time_of_day::{circular_distance, match_time_of_day, minute_of_day, TimeOfDayMatch};
pub use view::{compute_view, View, ViewContext};

pub const MAX_SCORE: u32 = 100;
const FREQUENCY_PER_VISIT: u32 = 2;

/// Recency buckets as (days strictly below, score).
const RECENCY_STEPS: [(f64, u32); 5] = [(1.0, 100), (7.0, 80), (30.0, 60), (90.0, 40), (180.0, 20)];
const RECENCY_FLOOR: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scores {
    pub frequency: u32,
    pub recency: u32,
}

/// An item together with the signals computed for the current pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub item: Item,
    pub scores: Scores,
    /// Set only while time-of-day emphasis is on.
    pub time_match: Option<TimeOfDayMatch>,
}

impl RankedItem {
    pub fn matches_time_of_day(&self) -> bool {
        self.time_match.map_or(false, |m| m.matches)
    }
}

pub fn frequency_score(visit_count: u32) -> u32 {
    visit_count.saturating_mul(FREQUENCY_PER_VISIT).min(MAX_SCORE)
}

pub fn recency_score(days_since: f64) -> u32 {
    RECENCY_STEPS
        .iter()
        .find(|(limit, _)| days_since < *limit)
        .map_or(RECENCY_FLOOR, |(_, score)| *score)
}

/// Days since the item's last activity. With no timestamp at all the epoch is
/// used, which lands in the lowest recency bucket.
pub fn days_since_activity(item: &Item, now: i64) -> f64 {
    let since = item.last_activity().unwrap_or(0);
    (now - since) as f64 / MILLIS_PER_DAY as f64
}

/// Folders always score zero; a disabled dimension contributes zero.
pub fn score_item(item: &Item, now: i64, options: &RankingOptions) -> Scores {
    if item.is_folder() {
        return Scores::default();
    }
    Scores {
        frequency: if options.frequency_enabled {
            frequency_score(item.effective_visit_count())
        } else {
            0
        },
        recency: if options.recency_enabled {
            recency_score(days_since_activity(item, now))
        } else {
            0
        },
    }
}
