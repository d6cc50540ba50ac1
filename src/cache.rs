//! Last-known feed cache (`SQLite`)
//!
//! Holds the most recent visible window per feed type so a cold start can show
//! something while the first fetch is outstanding. Pending mutations and staged
//! arrivals are never written here.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::Path;

use crate::models::{FeedType, Item};
use crate::paths;

/// Feed cache connection wrapper
pub struct FeedCache {
    conn: Connection,
}

impl FeedCache {
    /// Open or create the cache at the default location
    pub fn open() -> Result<Self> {
        let path = paths::cache_path()?;
        Self::open_path(&path)
    }

    /// Open or create the cache at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let conn = Connection::open(path).context("Failed to open feed cache")?;
        let cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS feed_window (
                feed_type TEXT NOT NULL,
                position INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                item_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (feed_type, position)
            );

            CREATE INDEX IF NOT EXISTS idx_feed_window_item ON feed_window(feed_type, item_id);
            ",
        )?;
        Ok(())
    }

    /// Replace the cached window for a feed
    pub fn save_window(&self, feed: FeedType, items: &[Item]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start cache transaction")?;
        tx.execute(
            "DELETE FROM feed_window WHERE feed_type = ?1",
            params![feed.as_query()],
        )?;

        let cached_at = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO feed_window (feed_type, position, item_id, item_json, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, item) in items.iter().enumerate() {
                let json = serde_json::to_string(item).context("Failed to encode item")?;
                stmt.execute(params![
                    feed.as_query(),
                    i64::try_from(position)?,
                    item.id,
                    json,
                    cached_at
                ])?;
            }
        }

        tx.commit().context("Failed to commit feed cache")?;
        tracing::debug!("Cached {} item(s) for {}", items.len(), feed.as_query());
        Ok(())
    }

    /// Load the cached window for a feed, in display order. Rows that no
    /// longer decode are skipped.
    pub fn load_window(&self, feed: FeedType, limit: usize) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_json FROM feed_window WHERE feed_type = ?1 ORDER BY position ASC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![feed.as_query(), i64::try_from(limit)?], |row| {
            row.get::<_, String>(0)
        })?;

        let mut items = Vec::new();
        for json in rows {
            match serde_json::from_str::<Item>(&json?) {
                Ok(item) => items.push(item),
                Err(e) => tracing::debug!("Skipping unreadable cached item: {e}"),
            }
        }
        Ok(items)
    }

    /// Drop every cached window
    pub fn clear(&self) -> Result<usize> {
        let count = self.conn.execute("DELETE FROM feed_window", [])?;
        Ok(count)
    }
}
