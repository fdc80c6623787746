use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{BookmarkNode, ROOT_ID};
use crate::stores::{load_entry, save_entry, BookmarkStore, KeyValueStore, StoreResult};

pub const USAGE_KEY: &str = "bookmarkUsage";

/// Upper bound on the ancestor walk; deeper chains are treated as malformed.
const MAX_ANCESTOR_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: String,
    pub last_used: i64,
    pub use_count: u32,
}

/// Persisted usage keyed by bookmark or folder id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageMap(BTreeMap<String, UsageRecord>);

impl UsageMap {
    pub fn get(&self, id: &str) -> Option<&UsageRecord> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Increments the use count and stamps `now`, creating the record on first use.
    pub fn stamp(&mut self, id: &str, now: i64) {
        let record = self.0.entry(id.to_string()).or_insert_with(|| UsageRecord {
            id: id.to_string(),
            last_used: now,
            use_count: 0,
        });
        record.use_count = record.use_count.saturating_add(1);
        record.last_used = now;
    }

    pub fn load<K: KeyValueStore + ?Sized>(store: &K) -> StoreResult<Self> {
        Ok(load_entry(store, USAGE_KEY)?.unwrap_or_default())
    }

    pub fn save<K: KeyValueStore + ?Sized>(&self, store: &K) -> StoreResult<()> {
        save_entry(store, USAGE_KEY, self)
    }
}

/// Best-effort side channel that counts navigations to bookmarked URLs.
pub struct UsageTracker<'a, B: ?Sized, K: ?Sized> {
    bookmarks: &'a B,
    kv: &'a K,
}

impl<'a, B, K> UsageTracker<'a, B, K>
where
    B: BookmarkStore + ?Sized,
    K: KeyValueStore + ?Sized,
{
    pub fn new(bookmarks: &'a B, kv: &'a K) -> Self {
        Self { bookmarks, kv }
    }

    /// Records one use of every bookmark matching `url` and of each of their
    /// ancestor folders. Returns how many records were touched; store faults
    /// are logged and reported as zero.
    pub fn record_use(&self, url: &str, now: i64) -> usize {
        match self.try_record_use(url, now) {
            Ok(touched) => touched,
            Err(err) => {
                tracing::warn!(%url, error = %err, "failed to update bookmark usage");
                0
            }
        }
    }

    /// A newly created bookmark counts as a use of its URL.
    pub fn on_bookmark_created(&self, node: &BookmarkNode, now: i64) -> usize {
        match &node.url {
            Some(url) => self.record_use(url, now),
            None => 0,
        }
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.kv.remove(&[USAGE_KEY])?;
        tracing::info!("cleared bookmark usage");
        Ok(())
    }

    fn try_record_use(&self, url: &str, now: i64) -> StoreResult<usize> {
        let matches = self.bookmarks.search_url(url)?;
        if matches.is_empty() {
            tracing::debug!(%url, "navigation did not match a bookmark");
            return Ok(0);
        }

        let mut usage = UsageMap::load(self.kv)?;
        let mut touched = 0;
        for bookmark in &matches {
            usage.stamp(&bookmark.id, now);
            touched += 1 + self.propagate_to_ancestors(bookmark.parent_id.as_deref(), &mut usage, now);
        }
        usage.save(self.kv)?;
        tracing::debug!(%url, bookmarks = matches.len(), touched, "recorded bookmark use");
        Ok(touched)
    }

    fn propagate_to_ancestors(&self, parent_id: Option<&str>, usage: &mut UsageMap, now: i64) -> usize {
        let mut touched = 0;
        let mut seen = HashSet::new();
        let mut current = parent_id.map(str::to_string);
        while let Some(id) = current.take() {
            if id.is_empty() || id == ROOT_ID {
                break;
            }
            if !seen.insert(id.clone()) || seen.len() > MAX_ANCESTOR_DEPTH {
                tracing::warn!(folder = %id, "ancestor chain loops or is too deep, stopping");
                break;
            }
            match self.bookmarks.get(&id) {
                Ok(Some(folder)) => {
                    usage.stamp(&id, now);
                    touched += 1;
                    current = folder.parent_id;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(folder = %id, error = %err, "failed to update folder usage");
                    break;
                }
            }
        }
        touched
    }
}
