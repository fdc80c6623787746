use time::OffsetDateTime;

use crate::config::RankingOptions;
use crate::hidden::HiddenSet;
use crate::model::Item;

use super::filter::{passes_filters, sort_ranked, FilterState};
use super::group::{group_items, ViewGroup};
use super::time_of_day::match_time_of_day;
use super::{score_item, RankedItem};

/// Clock and scoring rules for one pass.
#[derive(Debug, Clone)]
pub struct ViewContext<'a> {
    pub options: &'a RankingOptions,
    /// Local wall clock; its offset decides how visit times map onto the day.
    pub now: OffsetDateTime,
}

impl ViewContext<'_> {
    fn now_millis(&self) -> i64 {
        (self.now.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub groups: Vec<ViewGroup>,
    /// Items that survived filtering, before grouping.
    pub visible: usize,
    pub total: usize,
}

impl View {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Filters, scores, orders and groups `items`. Scores are recomputed from the
/// raw fields on every call.
pub fn compute_view(
    items: &[Item],
    state: &FilterState,
    hidden: &HiddenSet,
    search_text: &str,
    ctx: &ViewContext<'_>,
) -> View {
    let now = ctx.now_millis();
    let mut ranked: Vec<RankedItem> = items
        .iter()
        .filter(|item| passes_filters(item, state, hidden, search_text, ctx.options, now))
        .map(|item| RankedItem {
            scores: score_item(item, now, ctx.options),
            time_match: state
                .time_of_day
                .then(|| match_time_of_day(&item.visits, ctx.now, state.time_window_minutes)),
            item: item.clone(),
        })
        .collect();
    sort_ranked(&mut ranked, state.sort_by);

    let visible = ranked.len();
    tracing::debug!(total = items.len(), visible, group_by = %state.group_by, "computed view");
    View {
        groups: group_items(ranked, state.group_by, state.time_of_day),
        visible,
        total: items.len(),
    }
}
