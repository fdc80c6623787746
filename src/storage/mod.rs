use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::config::{ConfigPaths, StorageOptions};
use crate::model::{BookmarkNode, HistoryEntry, VisitItem, ROOT_ID};
use crate::stores::{
    BookmarkStore, HistoryStore, KeyValueStore, Record, StoreError, StoreResult,
};

mod schema;

const BOOKMARK_COLUMNS: &str = "id, parent_id, title, url, date_added";
const DEFAULT_FOLDERS: [(&str, &str); 2] = [("1", "Bookmarks Bar"), ("2", "Other Bookmarks")];

/// SQLite-backed bookmark, history and key-value store.
#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Appends a bookmark (or a folder when `url` is `None`) to `parent_id`.
    pub fn create_bookmark(
        &self,
        parent_id: &str,
        title: &str,
        url: Option<&str>,
        date_added: i64,
    ) -> Result<String> {
        self.with_connection(|conn| {
            let parent_url: Option<Option<String>> = conn
                .query_row(
                    "SELECT url FROM bookmarks WHERE id = ?1",
                    [parent_id],
                    |row| row.get(0),
                )
                .optional()
                .context("looking up parent folder")?;
            match parent_url {
                None => bail!("folder {parent_id} not found"),
                Some(Some(_)) => bail!("{parent_id} is a bookmark, not a folder"),
                Some(None) => {}
            }

            let next_id: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) + 1 FROM bookmarks",
                    [],
                    |row| row.get(0),
                )
                .context("allocating bookmark id")?;
            let position: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM bookmarks WHERE parent_id = ?1",
                    [parent_id],
                    |row| row.get(0),
                )
                .context("computing bookmark position")?;
            let id = next_id.to_string();
            conn.execute(
                "INSERT INTO bookmarks (id, parent_id, title, url, date_added, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, parent_id, title, url, date_added, position],
            )
            .context("inserting bookmark")?;
            Ok(id)
        })
    }

    /// Replaces every bookmark with `root`'s tree, keeping node ids.
    /// Returns how many nodes were stored, the root excluded.
    pub fn import_tree(&self, root: &BookmarkNode) -> Result<usize> {
        if !root.is_root() {
            bail!("imported tree must start at the root node \"{ROOT_ID}\"");
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting import transaction")?;
        tx.execute("DELETE FROM bookmarks", [])
            .context("clearing bookmarks")?;
        tx.execute(
            "INSERT INTO bookmarks (id, parent_id, title, url, date_added, position)
             VALUES (?1, NULL, ?2, NULL, ?3, 0)",
            params![ROOT_ID, root.title, root.date_added],
        )
        .context("inserting root")?;

        let mut imported = 0usize;
        let mut pending: Vec<(&BookmarkNode, &str)> = root
            .children
            .iter()
            .flatten()
            .rev()
            .map(|child| (child, ROOT_ID))
            .collect();
        let mut positions: HashMap<String, i64> = HashMap::new();
        while let Some((node, parent)) = pending.pop() {
            let position = positions.entry(parent.to_string()).or_insert(0);
            tx.execute(
                "INSERT INTO bookmarks (id, parent_id, title, url, date_added, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![node.id, parent, node.title, node.url, node.date_added, *position],
            )
            .with_context(|| format!("inserting bookmark {}", node.id))?;
            *position += 1;
            imported += 1;
            for child in node.children.iter().flatten().rev() {
                pending.push((child, node.id.as_str()));
            }
        }
        tx.commit().context("committing import")?;
        tracing::info!(imported, "imported bookmark tree");
        Ok(imported)
    }

    /// Appends one visit, as the navigation event source does on page load.
    pub fn record_visit(&self, url: &str, title: &str, visit_time: i64) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO visits (url, title, visit_time) VALUES (?1, ?2, ?3)",
                params![url, title, visit_time],
            )
            .context("recording visit")?;
            Ok(())
        })
    }

    fn load_bookmarks(&self) -> Result<Vec<BookmarkNode>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks
                 ORDER BY position, CAST(id AS INTEGER)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], bookmark_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("reading bookmarks")?;
            Ok(rows)
        })
    }
}

impl BookmarkStore for StorageHandle {
    fn get_tree(&self) -> StoreResult<BookmarkNode> {
        let rows = self
            .load_bookmarks()
            .map_err(|err| StoreError::unavailable("bookmark", err))?;
        build_tree(rows)
    }

    fn search_url(&self, url: &str) -> StoreResult<Vec<BookmarkNode>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE url = ?1
                 ORDER BY CAST(id AS INTEGER)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([url], bookmark_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .map_err(|err| StoreError::unavailable("bookmark", err))
    }

    fn get(&self, id: &str) -> StoreResult<Option<BookmarkNode>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], bookmark_from_row).optional()?)
        })
        .map_err(|err| StoreError::unavailable("bookmark", err))
    }
}

impl HistoryStore for StorageHandle {
    fn get_visits(&self, url: &str) -> StoreResult<Vec<VisitItem>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT visit_time FROM visits WHERE url = ?1 ORDER BY visit_time")?;
            let visits = stmt
                .query_map([url], |row| Ok(VisitItem { visit_time: row.get(0)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(visits)
        })
        .map_err(|err| StoreError::unavailable("history", err))
    }

    fn search(
        &self,
        query: &str,
        max_results: usize,
        start_time: i64,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let pattern = format!("%{}%", escape_like(query));
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                r"SELECT v.url,
                        (SELECT t.title FROM visits t
                          WHERE t.url = v.url
                          ORDER BY t.visit_time DESC LIMIT 1),
                        COUNT(*),
                        MAX(v.visit_time),
                        GROUP_CONCAT(v.visit_time)
                 FROM visits v
                 WHERE v.url LIKE ?1 ESCAPE '\' OR v.title LIKE ?1 ESCAPE '\'
                 GROUP BY v.url
                 HAVING MAX(v.visit_time) >= ?2
                 ORDER BY MAX(v.visit_time) DESC
                 LIMIT ?3",
            )?;
            let entries = stmt
                .query_map(params![pattern, start_time, max_results as i64], |row| {
                    let raw_visits: String = row.get(4)?;
                    Ok(HistoryEntry {
                        url: row.get(0)?,
                        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        visit_count: row.get::<_, i64>(2)? as u32,
                        last_visit_time: row.get(3)?,
                        visits: parse_visit_list(&raw_visits),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()
                .context("querying history")?;
            Ok(entries)
        })
        .map_err(|err| StoreError::unavailable("history", err))
    }
}

impl KeyValueStore for StorageHandle {
    fn get(&self, keys: &[&str]) -> StoreResult<Record> {
        let raw = self
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
                let mut found = Vec::new();
                for key in keys {
                    let value: Option<String> =
                        stmt.query_row([key], |row| row.get(0)).optional()?;
                    if let Some(value) = value {
                        found.push((key.to_string(), value));
                    }
                }
                Ok(found)
            })
            .map_err(|err| StoreError::unavailable("key-value", err))?;

        let mut record = Record::new();
        for (key, value) in raw {
            let parsed: Value = serde_json::from_str(&value)
                .map_err(|source| StoreError::Corrupt { key: key.clone(), source })?;
            record.insert(key, parsed);
        }
        Ok(record)
    }

    fn set(&self, record: Record) -> StoreResult<()> {
        let mut encoded = Vec::with_capacity(record.len());
        for (key, value) in record {
            let text = serde_json::to_string(&value)
                .map_err(|source| StoreError::Corrupt { key: key.clone(), source })?;
            encoded.push((key, text));
        }
        let write = || -> Result<()> {
            let mut conn = self.connect()?;
            let tx = conn.transaction()?;
            for (key, text) in &encoded {
                tx.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, text],
                )?;
            }
            tx.commit()?;
            Ok(())
        };
        write().map_err(|err| StoreError::unavailable("key-value", err))
    }

    fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        self.with_connection(|conn| {
            for key in keys {
                conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            }
            Ok(())
        })
        .map_err(|err| StoreError::unavailable("key-value", err))
    }
}

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<BookmarkNode> {
    let url: Option<String> = row.get(3)?;
    Ok(BookmarkNode {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        title: row.get(2)?,
        children: if url.is_none() { Some(Vec::new()) } else { None },
        url,
        date_added: row.get(4)?,
    })
}

/// Assembles rows into a tree hanging from the root. Rows unreachable from the
/// root (orphans) are dropped.
fn build_tree(rows: Vec<BookmarkNode>) -> StoreResult<BookmarkNode> {
    let mut root = None;
    let mut by_parent: HashMap<String, Vec<BookmarkNode>> = HashMap::new();
    for node in rows {
        if node.is_root() {
            root = Some(node);
        } else if let Some(parent) = node.parent_id.clone() {
            by_parent.entry(parent).or_default().push(node);
        }
    }
    let root = root.ok_or_else(|| StoreError::NotFound("bookmark root".into()))?;
    Ok(attach_children(root, &mut by_parent))
}

fn attach_children(
    mut node: BookmarkNode,
    by_parent: &mut HashMap<String, Vec<BookmarkNode>>,
) -> BookmarkNode {
    if node.url.is_none() {
        let children = by_parent.remove(&node.id).unwrap_or_default();
        node.children = Some(
            children
                .into_iter()
                .map(|child| attach_children(child, by_parent))
                .collect(),
        );
    }
    node
}

fn parse_visit_list(raw: &str) -> Vec<i64> {
    let mut visits: Vec<i64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    visits.sort_unstable_by(|a, b| b.cmp(a));
    visits
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    if !existed {
        seed_default_folders(&conn)?;
    }
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

fn seed_default_folders(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM bookmarks LIMIT 1", [], |row| row.get(0))
        .optional()
        .context("checking for existing bookmarks")?;
    if existing.is_some() {
        return Ok(());
    }

    tracing::info!("seeding default bookmark folders");
    conn.execute(
        "INSERT INTO bookmarks (id, parent_id, title, url, date_added, position)
         VALUES (?1, NULL, '', NULL, NULL, 0)",
        [ROOT_ID],
    )
    .context("inserting bookmark root")?;
    for (position, (id, title)) in DEFAULT_FOLDERS.iter().enumerate() {
        conn.execute(
            "INSERT INTO bookmarks (id, parent_id, title, url, date_added, position)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4)",
            params![id, ROOT_ID, title, position as i64],
        )
        .context("inserting default folder")?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::{init, StorageHandle};
    use crate::config::{ConfigPaths, StorageOptions};

    pub(crate) fn temp_storage() -> Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        let storage = init(&paths, &StorageOptions::default())?;
        Ok((temp, storage))
    }
}
