use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Identifier of the synthetic root node every bookmark tree hangs from.
pub const ROOT_ID: &str = "0";

const HISTORY_ID_PREFIX: &str = "history:";

/// A node of the host's bookmark tree. Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_added: Option<i64>,
    #[serde(default)]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }
}

/// Wall clock in milliseconds since the epoch, the unit every stored timestamp uses.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitItem {
    pub visit_time: i64,
}

/// One row of a history search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub visit_count: u32,
    #[serde(default)]
    pub last_visit_time: Option<i64>,
    /// Raw visit timestamps, newest first; empty when the store did not expand them.
    #[serde(default)]
    pub visits: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemId {
    Bookmark(String),
    History(String),
}

impl ItemId {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(HISTORY_ID_PREFIX) {
            Some(url) => ItemId::History(url.to_string()),
            None => ItemId::Bookmark(raw.to_string()),
        }
    }

    pub fn bookmark_id(&self) -> Option<&str> {
        match self {
            ItemId::Bookmark(id) => Some(id),
            ItemId::History(_) => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Bookmark(id) => f.write_str(id),
            ItemId::History(url) => write!(f, "{HISTORY_ID_PREFIX}{url}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    Bookmark,
    Folder,
    History,
}

/// The unit of ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub parent_id: Option<String>,
    pub url: Option<String>,
    pub title: String,
    pub kind: ItemKind,
    pub path: String,
    pub date_added: Option<i64>,
    pub visit_count: u32,
    pub last_visit_time: Option<i64>,
    /// Newest first.
    pub visits: Vec<i64>,
    /// Tracked uses from the usage map, if any.
    pub use_count: u32,
    pub last_used: Option<i64>,
}

impl Item {
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Visit signal used by scoring and the frequency filter.
    pub fn effective_visit_count(&self) -> u32 {
        self.visit_count.max(self.use_count)
    }

    /// Most recent activity: last visit or tracked use, falling back to the creation date.
    pub fn last_activity(&self) -> Option<i64> {
        match (self.last_visit_time, self.last_used) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => self.date_added,
        }
    }

    pub fn history(entry: &HistoryEntry) -> Self {
        Self {
            id: ItemId::History(entry.url.clone()),
            parent_id: None,
            url: Some(entry.url.clone()),
            title: if entry.title.is_empty() {
                entry.url.clone()
            } else {
                entry.title.clone()
            },
            kind: ItemKind::History,
            path: String::new(),
            date_added: None,
            visit_count: entry.visit_count,
            last_visit_time: entry.last_visit_time,
            visits: entry.visits.clone(),
            use_count: 0,
            last_used: None,
        }
    }
}
