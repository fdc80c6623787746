use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::Item;
use crate::stores::{load_entry, save_entry, KeyValueStore, StoreResult};
use crate::urls::domain_key;

pub const HIDDEN_KEY: &str = "hiddenItems";

const DOMAIN_PREFIX: &str = "domain:";
const HISTORY_PREFIX: &str = "history:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "lowercase")]
pub enum SuppressionKey {
    Url(String),
    /// Folder or bookmark id.
    Id(String),
    Domain(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideScope {
    Item,
    Domain,
}

impl SuppressionKey {
    /// Reads a key as shown by [`fmt::Display`]: `domain:` prefix, any absolute
    /// URL (including `javascript:` and `mailto:`), or else an item id.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(host) = raw.strip_prefix(DOMAIN_PREFIX) {
            SuppressionKey::Domain(host.to_lowercase())
        } else if !raw.starts_with(HISTORY_PREFIX) && Url::parse(raw).is_ok() {
            SuppressionKey::Url(raw.to_string())
        } else {
            SuppressionKey::Id(raw.to_string())
        }
    }

    pub fn for_item(item: &Item, scope: HideScope) -> Self {
        match (&item.url, scope) {
            (Some(url), HideScope::Item) => SuppressionKey::Url(url.clone()),
            (Some(url), HideScope::Domain) => SuppressionKey::Domain(domain_key(url)),
            (None, _) => SuppressionKey::Id(item.id.to_string()),
        }
    }
}

impl fmt::Display for SuppressionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionKey::Url(url) => f.write_str(url),
            SuppressionKey::Id(id) => f.write_str(id),
            SuppressionKey::Domain(host) => write!(f, "{DOMAIN_PREFIX}{host}"),
        }
    }
}

/// Persisted suppression keys. Membership is evaluated against each item on
/// every view, so a domain key also hides items that show up later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HiddenSet(BTreeSet<SuppressionKey>);

impl HiddenSet {
    pub fn hides(&self, item: &Item) -> bool {
        if self.0.is_empty() {
            return false;
        }
        if self.0.contains(&SuppressionKey::Id(item.id.to_string())) {
            return true;
        }
        match &item.url {
            Some(url) => {
                self.0.contains(&SuppressionKey::Url(url.clone()))
                    || self.0.contains(&SuppressionKey::Domain(domain_key(url)))
            }
            None => false,
        }
    }

    pub fn insert(&mut self, key: SuppressionKey) -> bool {
        self.0.insert(key)
    }

    /// Returns how many keys were new.
    pub fn extend(&mut self, keys: impl IntoIterator<Item = SuppressionKey>) -> usize {
        keys.into_iter().filter(|key| self.0.insert(key.clone())).count()
    }

    pub fn remove(&mut self, key: &SuppressionKey) -> bool {
        self.0.remove(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &SuppressionKey) -> bool {
        self.0.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuppressionKey> {
        self.0.iter()
    }

    /// Keys whose rendered form contains `filter`, ignoring case.
    pub fn search(&self, filter: &str) -> Vec<&SuppressionKey> {
        let needle = filter.trim().to_lowercase();
        self.0
            .iter()
            .filter(|key| needle.is_empty() || key.to_string().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn load<K: KeyValueStore + ?Sized>(store: &K) -> StoreResult<Self> {
        Ok(load_entry(store, HIDDEN_KEY)?.unwrap_or_default())
    }

    pub fn save<K: KeyValueStore + ?Sized>(&self, store: &K) -> StoreResult<()> {
        save_entry(store, HIDDEN_KEY, self)
    }
}
