//! SQLite-backed state store for discovered items and their summaries.
//!
//! Tables:
//! - `items` - UPSERT on `address`; content columns are refreshed, `first_seen`
//!   and `processed` are never touched by a re-save
//! - `summaries` - INSERT OR REPLACE on `address` (one current summary per item)
//!
//! The store owns a single connection for the whole process. It must be
//! initialized with [`Store::init`] before use and released with
//! [`Store::shutdown`]; every operation on an uninitialized store fails with
//! [`StoreError::NotInitialized`].
//!
//! The `processed` flag only ever goes from 0 to 1. Nothing in this module
//! resets it.

use crate::error::StoreError;
use crate::models::{Item, ORIGIN_SUBSTACK, Post, SummaryRecord};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Addresses per `UPDATE ... WHERE address IN (...)` statement.
pub const MARK_CHUNK_SIZE: usize = 10;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    domain        TEXT NOT NULL,
    address       TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL DEFAULT '',
    subtitle      TEXT NOT NULL DEFAULT '',
    like_count    INTEGER NOT NULL DEFAULT 0,
    date          TEXT,
    body          TEXT NOT NULL DEFAULT '',
    origin        TEXT NOT NULL,
    first_seen    TEXT NOT NULL,
    last_updated  TEXT NOT NULL,
    processed     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_items_domain_processed ON items (domain, processed);

CREATE TABLE IF NOT EXISTS summaries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    address     TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL DEFAULT '',
    subtitle    TEXT NOT NULL DEFAULT '',
    domain      TEXT NOT NULL,
    date        TEXT,
    summary     TEXT NOT NULL,
    category    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

const ITEM_COLUMNS: &str = "domain, address, title, subtitle, like_count, date, body, origin, first_seen, last_updated, processed";

/// Durable record of items and summaries.
#[derive(Debug, Default)]
pub struct Store {
    conn: Option<Connection>,
}

impl Store {
    /// An uninitialized store.
    pub fn new() -> Self {
        Self { conn: None }
    }

    /// Open (or create) the database file and apply the schema.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn init(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        self.install(conn)
    }

    /// Initialize against a private in-memory database.
    pub fn init_in_memory(&mut self) -> Result<(), StoreError> {
        self.install(Connection::open_in_memory()?)
    }

    /// Shorthand for [`Store::new`] followed by [`Store::init`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.init(path)?;
        Ok(store)
    }

    /// Shorthand for [`Store::new`] followed by [`Store::init_in_memory`].
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.init_in_memory()?;
        Ok(store)
    }

    fn install(&mut self, conn: Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA)?;
        self.conn = Some(conn);
        info!("State store initialized");
        Ok(())
    }

    /// Close the connection. The store reports [`StoreError::NotInitialized`]
    /// afterwards until it is initialized again.
    pub fn shutdown(&mut self) -> Result<(), StoreError> {
        match self.conn.take() {
            Some(conn) => {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
                info!("State store closed");
                Ok(())
            }
            None => Err(StoreError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotInitialized)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::NotInitialized)
    }

    /// Every address already recorded for `domain`, processed or not.
    pub fn existing_addresses(&self, domain: &str) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT address FROM items WHERE domain = ?1")?;
        let addresses = stmt
            .query_map(params![domain], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        debug!(domain, count = addresses.len(), "Loaded known addresses");
        Ok(addresses)
    }

    /// Insert or refresh posts, stamped with the current time.
    pub fn save_items(&mut self, posts: &[Post]) -> Result<usize, StoreError> {
        self.save_items_at(posts, Utc::now())
    }

    /// Insert or refresh posts in one transaction.
    ///
    /// New rows get `first_seen = last_updated = now` and `processed = 0`.
    /// Existing rows get their content columns and `last_updated` replaced.
    pub fn save_items_at(&mut self, posts: &[Post], now: DateTime<Utc>) -> Result<usize, StoreError> {
        let tx = self.conn_mut()?.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO items (domain, address, title, subtitle, like_count, date, body, origin, first_seen, last_updated, processed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 0)
                ON CONFLICT(address) DO UPDATE SET
                    domain = excluded.domain,
                    title = excluded.title,
                    subtitle = excluded.subtitle,
                    like_count = excluded.like_count,
                    date = excluded.date,
                    body = excluded.body,
                    origin = excluded.origin,
                    last_updated = excluded.last_updated
                "#,
            )?;
            for post in posts {
                stmt.execute(params![
                    post.domain,
                    post.address,
                    post.title,
                    post.subtitle,
                    post.like_count,
                    post.date,
                    post.body,
                    ORIGIN_SUBSTACK,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        info!(count = posts.len(), "Saved posts to the store");
        Ok(posts.len())
    }

    /// Look up one item by address.
    pub fn item(&self, address: &str) -> Result<Option<Item>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE address = ?1");
        let item = conn
            .query_row(&sql, params![address], item_from_row)
            .optional()?;
        Ok(item)
    }

    /// The `per_domain` most recent unprocessed items of every domain.
    ///
    /// Ranked by publish date descending (unknown dates last) within a
    /// domain; the result is ordered by domain, then date descending.
    pub fn recent_unprocessed_by_domain(&self, per_domain: usize) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            WITH ranked AS (
                SELECT {ITEM_COLUMNS},
                       ROW_NUMBER() OVER (
                           PARTITION BY domain
                           ORDER BY date IS NULL, date DESC, id ASC
                       ) AS rank
                FROM items
                WHERE processed = 0
            )
            SELECT {ITEM_COLUMNS} FROM ranked
            WHERE rank <= ?1
            ORDER BY domain, date IS NULL, date DESC, rank
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![per_domain as i64], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(per_domain, count = items.len(), "Selected unprocessed candidates");
        Ok(items)
    }

    /// Number of unprocessed items per domain, ordered by domain.
    pub fn unprocessed_counts(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*) FROM items WHERE processed = 0 GROUP BY domain ORDER BY domain",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Flip `processed` to 1 for the given addresses.
    ///
    /// Runs one committed statement per [`MARK_CHUNK_SIZE`] addresses and
    /// returns the number of rows changed. Unknown addresses are ignored.
    #[instrument(level = "info", skip_all, fields(count = addresses.len()))]
    pub fn mark_processed(&mut self, addresses: &[String]) -> Result<usize, StoreError> {
        let conn = self.conn_mut()?;
        let mut changed = 0;
        for chunk in addresses.chunks(MARK_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("UPDATE items SET processed = 1 WHERE address IN ({placeholders})");
            let tx = conn.transaction()?;
            changed += tx.execute(&sql, params_from_iter(chunk.iter()))?;
            tx.commit()?;
        }
        info!(changed, "Marked posts as processed");
        Ok(changed)
    }

    /// Write a summary, replacing any previous one for the same address.
    pub fn save_summary(&mut self, record: &SummaryRecord) -> Result<(), StoreError> {
        let conn = self.conn_mut()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO summaries (address, title, subtitle, domain, date, summary, category, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.address,
                record.title,
                record.subtitle,
                record.domain,
                record.date,
                record.summary,
                record.category,
                Utc::now(),
            ],
        )?;
        debug!(address = %record.address, "Saved summary");
        Ok(())
    }

    /// Current summary for an address.
    pub fn summary(&self, address: &str) -> Result<Option<SummaryRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT address, title, subtitle, domain, date, summary, category FROM summaries WHERE address = ?1",
                params![address],
                |row| {
                    Ok(SummaryRecord {
                        address: row.get(0)?,
                        title: row.get(1)?,
                        subtitle: row.get(2)?,
                        domain: row.get(3)?,
                        date: row.get(4)?,
                        summary: row.get(5)?,
                        category: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Rows in `summaries` for one address (0 or 1).
    pub fn summary_rows(&self, address: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM summaries WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        domain: row.get(0)?,
        address: row.get(1)?,
        title: row.get(2)?,
        subtitle: row.get(3)?,
        like_count: row.get(4)?,
        date: row.get(5)?,
        body: row.get(6)?,
        origin: row.get(7)?,
        first_seen: row.get(8)?,
        last_updated: row.get(9)?,
        processed: row.get(10)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    pub(crate) fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
    }

    pub(crate) fn post(domain: &str, slug: &str, date: Option<DateTime<Utc>>) -> Post {
        Post {
            domain: domain.to_string(),
            address: format!("https://{domain}.substack.com/p/{slug}"),
            title: format!("Title {slug}"),
            subtitle: format!("Subtitle {slug}"),
            like_count: 7,
            date,
            body: format!("# Title {slug}\n\nBody of {slug}"),
        }
    }

    #[test]
    fn test_operations_fail_before_init() {
        let store = Store::new();
        assert!(!store.is_initialized());
        assert!(matches!(
            store.existing_addresses("alpha"),
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            store.recent_unprocessed_by_domain(3),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_operations_fail_after_shutdown() {
        let mut store = Store::open_in_memory().unwrap();
        store.shutdown().unwrap();
        assert!(matches!(
            store.save_items(&[post("alpha", "a", None)]),
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(store.shutdown(), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_file_backed_store_persists_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut store = Store::open(file.path()).unwrap();
            store.save_items(&[post("alpha", "a", Some(at(1)))]).unwrap();
            store.shutdown().unwrap();
        }
        let store = Store::open(file.path()).unwrap();
        let known = store.existing_addresses("alpha").unwrap();
        assert!(known.contains("https://alpha.substack.com/p/a"));
    }

    #[test]
    fn test_resave_keeps_first_seen_and_processed_flag() {
        let mut store = Store::open_in_memory().unwrap();
        let original = post("alpha", "a", Some(at(1)));
        store.save_items_at(&[original.clone()], at(10)).unwrap();
        store.mark_processed(&[original.address.clone()]).unwrap();

        let mut refreshed = original.clone();
        refreshed.title = "New title".to_string();
        refreshed.like_count = 99;
        store.save_items_at(&[refreshed], at(20)).unwrap();

        let item = store.item(&original.address).unwrap().unwrap();
        assert_eq!(item.title, "New title");
        assert_eq!(item.like_count, 99);
        assert_eq!(item.first_seen, at(10));
        assert_eq!(item.last_updated, at(20));
        assert!(item.processed);

        let rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_existing_addresses_is_per_domain_and_ignores_flag() {
        let mut store = Store::open_in_memory().unwrap();
        let a = post("alpha", "a", None);
        let b = post("alpha", "b", None);
        let c = post("beta", "c", None);
        store.save_items(&[a.clone(), b.clone(), c]).unwrap();
        store.mark_processed(&[a.address.clone()]).unwrap();

        let known = store.existing_addresses("alpha").unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains(&a.address));
        assert!(known.contains(&b.address));
    }

    #[test]
    fn test_recent_unprocessed_caps_per_domain_and_orders_by_date() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .save_items(&[
                post("beta", "b1", Some(at(2))),
                post("alpha", "a3", Some(at(3))),
                post("alpha", "a1", Some(at(1))),
                post("alpha", "a2", Some(at(2))),
                post("alpha", "undated", None),
            ])
            .unwrap();

        let items = store.recent_unprocessed_by_domain(2).unwrap();
        let slugs: Vec<&str> = items
            .iter()
            .map(|i| i.address.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(slugs, vec!["a3", "a2", "b1"]);
    }

    #[test]
    fn test_recent_unprocessed_skips_processed_items() {
        let mut store = Store::open_in_memory().unwrap();
        let newest = post("alpha", "new", Some(at(5)));
        store
            .save_items(&[newest.clone(), post("alpha", "old", Some(at(1)))])
            .unwrap();
        store.mark_processed(&[newest.address]).unwrap();

        let items = store.recent_unprocessed_by_domain(3).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].address.ends_with("/old"));
    }

    #[test]
    fn test_mark_processed_handles_more_than_one_chunk() {
        let mut store = Store::open_in_memory().unwrap();
        let posts: Vec<Post> = (0..25).map(|i| post("alpha", &format!("p{i}"), None)).collect();
        store.save_items(&posts).unwrap();

        let mut addresses: Vec<String> = posts.iter().map(|p| p.address.clone()).collect();
        addresses.push("https://alpha.substack.com/p/unknown".to_string());

        assert_eq!(store.mark_processed(&addresses).unwrap(), 25);
        assert!(store.recent_unprocessed_by_domain(100).unwrap().is_empty());
        assert!(store.unprocessed_counts().unwrap().is_empty());
    }

    #[test]
    fn test_unprocessed_counts_per_domain() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .save_items(&[
                post("alpha", "a", None),
                post("alpha", "b", None),
                post("beta", "c", None),
            ])
            .unwrap();
        assert_eq!(
            store.unprocessed_counts().unwrap(),
            vec![("alpha".to_string(), 2), ("beta".to_string(), 1)]
        );
    }

    #[test]
    fn test_save_summary_replaces_previous_text() {
        let mut store = Store::open_in_memory().unwrap();
        let mut record = SummaryRecord {
            address: "https://alpha.substack.com/p/a".to_string(),
            title: "A".to_string(),
            subtitle: String::new(),
            domain: "alpha".to_string(),
            date: Some(at(1)),
            summary: "first".to_string(),
            category: "sales".to_string(),
        };
        store.save_summary(&record).unwrap();
        record.summary = "second".to_string();
        store.save_summary(&record).unwrap();

        assert_eq!(store.summary_rows(&record.address).unwrap(), 1);
        let stored = store.summary(&record.address).unwrap().unwrap();
        assert_eq!(stored.summary, "second");
        assert_eq!(stored.date, Some(at(1)));
    }
}
