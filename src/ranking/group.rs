use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::hidden::{HideScope, SuppressionKey};
use crate::urls::{domain_key, without_query};

use super::RankedItem;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GroupMode {
    #[default]
    None,
    Domain,
    Path,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// One item, no bucketing.
    Single,
    Bucket(String),
    /// All folders together, never collapsed.
    Folders,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewGroup {
    pub kind: GroupKind,
    pub items: Vec<RankedItem>,
}

impl ViewGroup {
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            GroupKind::Bucket(key) => Some(key),
            GroupKind::Single | GroupKind::Folders => None,
        }
    }

    /// Items rendered expanded: the representative, or every folder.
    pub fn shown(&self) -> &[RankedItem] {
        match self.kind {
            GroupKind::Folders => &self.items,
            GroupKind::Single | GroupKind::Bucket(_) => &self.items[..self.items.len().min(1)],
        }
    }

    pub fn collapsed(&self) -> &[RankedItem] {
        &self.items[self.shown().len()..]
    }

    pub fn hidden_count(&self) -> usize {
        self.collapsed().len()
    }

    /// Keys that hide every member at once.
    pub fn suppression_keys(&self) -> Vec<SuppressionKey> {
        self.items
            .iter()
            .map(|ranked| SuppressionKey::for_item(&ranked.item, HideScope::Item))
            .collect()
    }
}

/// Buckets already-sorted items. Bucket order follows each bucket's first
/// member; with time-of-day emphasis, members closest to now move first
/// inside their own bucket only.
pub fn group_items(items: Vec<RankedItem>, mode: GroupMode, emphasize_time: bool) -> Vec<ViewGroup> {
    if mode == GroupMode::None {
        return items
            .into_iter()
            .map(|item| ViewGroup {
                kind: GroupKind::Single,
                items: vec![item],
            })
            .collect();
    }

    let mut folders = Vec::new();
    let mut buckets: IndexMap<String, Vec<RankedItem>> = IndexMap::new();
    for ranked in items {
        if ranked.item.is_folder() {
            folders.push(ranked);
            continue;
        }
        let key = group_key(&ranked, mode);
        buckets.entry(key).or_default().push(ranked);
    }

    let mut groups: Vec<ViewGroup> = buckets
        .into_iter()
        .map(|(key, mut members)| {
            if emphasize_time {
                members.sort_by_key(|ranked| {
                    ranked
                        .time_match
                        .and_then(|m| m.closest_minutes)
                        .unwrap_or(u32::MAX)
                });
            }
            ViewGroup {
                kind: GroupKind::Bucket(key),
                items: members,
            }
        })
        .collect();
    if !folders.is_empty() {
        groups.push(ViewGroup {
            kind: GroupKind::Folders,
            items: folders,
        });
    }
    groups
}

fn group_key(ranked: &RankedItem, mode: GroupMode) -> String {
    let item = &ranked.item;
    let url = item.url.as_deref().unwrap_or_default();
    match mode {
        GroupMode::Domain => domain_key(url),
        GroupMode::Path => without_query(url),
        GroupMode::Title | GroupMode::None => item.title.clone(),
    }
}
