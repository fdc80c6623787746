use crate::model::Item;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 604_800;
const MONTH: i64 = 2_592_000;
const YEAR: i64 = 31_536_000;

pub const EMPTY_TITLE: &str = "No bookmarks found";
pub const EMPTY_HINT: &str = "Start using your bookmarks to see them here";

/// Coarse "time ago" label for a millisecond timestamp.
pub fn time_ago(timestamp: i64, now: i64) -> String {
    let seconds = (now - timestamp).max(0) / 1000;
    if seconds < MINUTE {
        "Just now".to_string()
    } else if seconds < HOUR {
        format!("{}m ago", seconds / MINUTE)
    } else if seconds < DAY {
        format!("{}h ago", seconds / HOUR)
    } else if seconds < WEEK {
        format!("{}d ago", seconds / DAY)
    } else if seconds < MONTH {
        format!("{}w ago", seconds / WEEK)
    } else if seconds < YEAR {
        format!("{}mo ago", seconds / MONTH)
    } else {
        format!("{}y ago", seconds / YEAR)
    }
}

fn times(count: u32) -> &'static str {
    if count == 1 {
        "time"
    } else {
        "times"
    }
}

/// One-line usage summary: tracked use, then history, then creation date.
pub fn meta_text(item: &Item, now: i64) -> String {
    if let Some(last_used) = item.last_used {
        return format!(
            "Used {} {} • {}",
            item.use_count,
            times(item.use_count),
            time_ago(last_used, now)
        );
    }
    if let Some(last_visit) = item.last_visit_time {
        return format!(
            "Visited {} {} • {}",
            item.visit_count,
            times(item.visit_count),
            time_ago(last_visit, now)
        );
    }
    match item.date_added {
        Some(added) => format!("Created {}", time_ago(added, now)),
        None => "No usage data".to_string(),
    }
}
