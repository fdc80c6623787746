//! Capability traits for the host platform's stores.
//!
//! The ranking pipeline only ever talks to these seams; `storage::StorageHandle`
//! is the SQLite-backed implementation shipped with the CLI.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{BookmarkNode, HistoryEntry, VisitItem};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Record shape exchanged with a [`KeyValueStore`].
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} store unavailable: {source}")]
    Unavailable {
        store: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("stored entry '{key}' is malformed: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
}

impl StoreError {
    pub fn unavailable(store: &'static str, source: impl Into<BoxError>) -> Self {
        StoreError::Unavailable {
            store,
            source: source.into(),
        }
    }
}

pub trait BookmarkStore {
    /// The whole tree, rooted at the synthetic root (`"0"`).
    fn get_tree(&self) -> StoreResult<BookmarkNode>;

    /// Every bookmark whose URL is exactly `url`.
    fn search_url(&self, url: &str) -> StoreResult<Vec<BookmarkNode>>;

    fn get(&self, id: &str) -> StoreResult<Option<BookmarkNode>>;
}

pub trait HistoryStore {
    /// Visits of `url` in store order.
    fn get_visits(&self, url: &str) -> StoreResult<Vec<VisitItem>>;

    /// History entries whose URL or title contains `query`, visited at or after `start_time`.
    fn search(
        &self,
        query: &str,
        max_results: usize,
        start_time: i64,
    ) -> StoreResult<Vec<HistoryEntry>>;
}

pub trait KeyValueStore {
    /// Present keys only; missing keys are simply absent from the record.
    fn get(&self, keys: &[&str]) -> StoreResult<Record>;

    fn set(&self, record: Record) -> StoreResult<()>;

    fn remove(&self, keys: &[&str]) -> StoreResult<()>;
}

/// Reads one named entry and decodes it.
pub fn load_entry<T, K>(store: &K, key: &str) -> StoreResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
    K: KeyValueStore + ?Sized,
{
    let mut record = store.get(&[key])?;
    match record.remove(key) {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encodes a value and writes it under one named entry.
pub fn save_entry<T, K>(store: &K, key: &str, value: &T) -> StoreResult<()>
where
    T: serde::Serialize,
    K: KeyValueStore + ?Sized,
{
    let encoded = serde_json::to_value(value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    let mut record = Record::new();
    record.insert(key.to_string(), encoded);
    store.set(record)
}
