use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            url TEXT,
            date_added INTEGER,
            position INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS bookmarks_parent ON bookmarks(parent_id, position);
        CREATE INDEX IF NOT EXISTS bookmarks_url ON bookmarks(url);

        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            visit_time INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS visits_url ON visits(url, visit_time);

        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
