//! In-memory store. Same contract as the SQLite adapter, no durability.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::Store;
use crate::error::{Error, Result};
use crate::model::{Item, ItemId};

/// Items keyed by id. Iteration order of the map is the delivery order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<ItemId, Item>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert(&mut self, item: &Item) -> Result<()> {
        if self.items.contains_key(&item.id) {
            return Err(Error::DuplicateId(item.id));
        }
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    fn update(&mut self, item: &Item) -> Result<bool> {
        match self.items.get_mut(&item.id) {
            Some(stored) => {
                stored.visible_at = item.visible_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&mut self, id: ItemId) -> Result<bool> {
        Ok(self.items.remove(&id).is_some())
    }

    fn first_visible(&self, now: DateTime<Utc>) -> Result<Option<Item>> {
        Ok(self
            .items
            .values()
            .find(|item| item.visible_at <= now)
            .cloned())
    }

    fn max_id(&self) -> Result<Option<ItemId>> {
        Ok(self.items.keys().next_back().copied())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn rejects_duplicate_ids() {
        let mut store = MemoryStore::new();
        let item = Item::new(ItemId(1), Utc::now(), b"a".to_vec());

        store.insert(&item).unwrap();
        let err = store.insert(&item).unwrap_err();

        assert!(matches!(err, Error::DuplicateId(ItemId(1))));
    }

    #[test]
    fn update_only_moves_visibility() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let mut item = Item::new(ItemId(1), now, b"a".to_vec());
        store.insert(&item).unwrap();

        item.payload = b"changed".to_vec();
        item.hide_until(now + TimeDelta::seconds(5));
        assert!(store.update(&item).unwrap());

        assert!(store.first_visible(now).unwrap().is_none());
        let later = store
            .first_visible(item.visible_at)
            .unwrap()
            .unwrap();
        assert_eq!(later.payload, b"a");
    }
}
