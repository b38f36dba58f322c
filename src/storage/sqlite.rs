//! SQLite storage adapter.
//!
//! One database file per queue. WAL mode, a single `queue_items` table keyed by
//! item id, and an index on `visible_at` for the visibility predicate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSqlError, Type};
use rusqlite::{Connection, OptionalExtension, params};

use super::{Store, StoreOpener};
use crate::error::Result;
use crate::model::{Item, ItemId};

/// File extension used for per-queue database files.
const DB_EXTENSION: &str = "sqlite3";

/// Store backend. Owns the SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.init(busy_timeout)?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.init(Duration::ZERO)?;
        Ok(store)
    }

    fn init(&mut self, busy_timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(busy_timeout)?;
        // WAL mode for crash safety without blocking readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS queue_items (
                id          INTEGER PRIMARY KEY,
                visible_at  INTEGER NOT NULL,
                payload     BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queue_items_visible_at
                ON queue_items(visible_at);
            ",
        )?;

        Ok(())
    }
}

impl Store for SqliteStore {
    fn insert(&mut self, item: &Item) -> Result<()> {
        self.conn.execute(
            "INSERT INTO queue_items (id, visible_at, payload) VALUES (?1, ?2, ?3)",
            params![item.id.0, item.visible_at.timestamp_millis(), item.payload],
        )?;
        Ok(())
    }

    fn update(&mut self, item: &Item) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE queue_items SET visible_at = ?1 WHERE id = ?2",
            params![item.visible_at.timestamp_millis(), item.id.0],
        )?;
        Ok(changed > 0)
    }

    fn delete(&mut self, id: ItemId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM queue_items WHERE id = ?1", params![id.0])?;
        Ok(changed > 0)
    }

    fn first_visible(&self, now: DateTime<Utc>) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, visible_at, payload FROM queue_items
                 WHERE visible_at <= ?1
                 ORDER BY id ASC
                 LIMIT 1",
                params![now.timestamp_millis()],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn max_id(&self) -> Result<Option<ItemId>> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(id) FROM queue_items", [], |row| row.get(0))?;
        Ok(max.map(ItemId))
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM queue_items", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Opener
// ---------------------------------------------------------------------------

/// Where [`SqliteOpener`] keeps queue databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// One `<name>.sqlite3` file per queue inside this directory.
    Directory(PathBuf),
    /// A private in-memory database per opened queue. Nothing survives dispose.
    InMemory,
}

/// Opens a [`SqliteStore`] per queue name.
#[derive(Debug, Clone)]
pub struct SqliteOpener {
    location: StoreLocation,
    busy_timeout: Duration,
}

impl SqliteOpener {
    pub fn new(location: StoreLocation, busy_timeout: Duration) -> Self {
        Self {
            location,
            busy_timeout,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::InMemory, Duration::ZERO)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Database file backing `name`, if this opener is directory-backed.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        match &self.location {
            StoreLocation::Directory(dir) => Some(dir.join(format!("{name}.{DB_EXTENSION}"))),
            StoreLocation::InMemory => None,
        }
    }
}

impl StoreOpener for SqliteOpener {
    fn open(&self, name: &str) -> Result<Box<dyn Store>> {
        let store = match &self.location {
            StoreLocation::Directory(dir) => {
                std::fs::create_dir_all(dir)?;
                SqliteStore::open(dir.join(format!("{name}.{DB_EXTENSION}")), self.busy_timeout)?
            }
            StoreLocation::InMemory => SqliteStore::in_memory()?,
        };
        Ok(Box::new(store))
    }
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    let millis: i64 = row.get(1)?;
    let visible_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Integer,
            Box::new(FromSqlError::OutOfRange(millis)),
        )
    })?;

    Ok(Item {
        id: ItemId(row.get(0)?),
        visible_at,
        payload: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn item(id: i64, visible_at: DateTime<Utc>, payload: &[u8]) -> Item {
        Item::new(ItemId(id), visible_at, payload.to_vec())
    }

    #[test]
    fn first_visible_orders_by_id_not_insertion() {
        let mut store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        store.insert(&item(20, now, b"b")).unwrap();
        store.insert(&item(10, now, b"a")).unwrap();

        let first = store.first_visible(now).unwrap().unwrap();
        assert_eq!(first.id, ItemId(10));
        assert_eq!(first.payload, b"a");
    }

    #[test]
    fn first_visible_skips_future_rows() {
        let mut store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert(&item(1, now + TimeDelta::seconds(30), b"later"))
            .unwrap();
        store.insert(&item(2, now, b"now")).unwrap();

        let first = store.first_visible(now).unwrap().unwrap();
        assert_eq!(first.id, ItemId(2));
    }

    #[test]
    fn duplicate_insert_is_a_storage_error() {
        let mut store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        store.insert(&item(1, now, b"a")).unwrap();
        let err = store.insert(&item(1, now, b"b")).unwrap_err();

        assert!(matches!(err, crate::error::Error::Storage(_)));
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let mut store = SqliteStore::in_memory().unwrap();
        let missing = item(7, Utc::now(), b"gone");

        assert!(!store.update(&missing).unwrap());
        assert!(!store.delete(missing.id).unwrap());
    }

    #[test]
    fn max_id_and_len_track_contents() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.max_id().unwrap(), None);
        assert_eq!(store.len().unwrap(), 0);

        let now = Utc::now();
        store.insert(&item(3, now, b"a")).unwrap();
        store.insert(&item(9, now, b"b")).unwrap();

        assert_eq!(store.max_id().unwrap(), Some(ItemId(9)));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn directory_opener_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let opener = SqliteOpener::new(
            StoreLocation::Directory(dir.path().join("queues")),
            Duration::from_secs(1),
        );

        {
            let mut store = opener.open("jobs").unwrap();
            store.insert(&item(1, Utc::now(), b"kept")).unwrap();
        }

        let store = opener.open("jobs").unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(opener.path_for("jobs").unwrap().exists());
    }
}
