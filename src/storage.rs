//! Durable store contract.
//!
//! The queue owns exactly one [`Store`] handle and calls it only while holding
//! its instance lock, so implementations need `Send` but not `Sync`. A
//! [`StoreOpener`] produces the handle for a queue name when the registry
//! first creates that queue.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Item, ItemId};

pub use memory::MemoryStore;
pub use sqlite::{SqliteOpener, SqliteStore, StoreLocation};

/// Ordered keyed table of items with a secondary index on visibility.
pub trait Store: Send {
    /// Insert a new item. Fails if the id is already present.
    fn insert(&mut self, item: &Item) -> Result<()>;

    /// Persist `item.visible_at` for the row keyed by `item.id`.
    /// Returns `false` if no such row exists.
    fn update(&mut self, item: &Item) -> Result<bool>;

    /// Remove the row keyed by `id`. Returns `false` if it was already gone.
    fn delete(&mut self, id: ItemId) -> Result<bool>;

    /// The item with the smallest id among those with `visible_at <= now`.
    fn first_visible(&self, now: DateTime<Utc>) -> Result<Option<Item>>;

    /// Largest stored id. Seeds id generation when a queue opens.
    fn max_id(&self) -> Result<Option<ItemId>>;

    /// Number of stored items, visible or leased.
    fn len(&self) -> Result<usize>;
}

/// Opens the store backing a named queue.
pub trait StoreOpener: Send + Sync {
    fn open(&self, name: &str) -> Result<Box<dyn Store>>;
}

impl<F> StoreOpener for F
where
    F: Fn(&str) -> Result<Box<dyn Store>> + Send + Sync,
{
    fn open(&self, name: &str) -> Result<Box<dyn Store>> {
        self(name)
    }
}
