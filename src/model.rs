//! Core data model.
//!
//! An item is an opaque payload with an ordering identity and a visibility
//! timestamp. The queue never looks inside the payload; it only moves the
//! timestamp around to hide and reveal the item.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A queued record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Ordering key. Strictly ascending in creation order within a queue.
    pub id: ItemId,

    /// The item is deliverable once `visible_at <= now`. Held at millisecond
    /// precision so the in-memory value matches what the store persists.
    pub visible_at: DateTime<Utc>,

    /// Opaque bytes. Never interpreted by the queue.
    pub payload: Vec<u8>,
}

impl Item {
    /// A fresh, immediately visible item.
    pub fn new(id: ItemId, now: DateTime<Utc>, payload: Vec<u8>) -> Self {
        Self {
            id,
            visible_at: truncate_to_millis(now),
            payload,
        }
    }

    /// Where this item sits in the visibility state machine at `now`.
    pub fn visibility(&self, now: DateTime<Utc>) -> Visibility {
        if self.visible_at <= now {
            Visibility::Visible
        } else {
            Visibility::Leased
        }
    }

    /// Lease deadlines round up so an item is never visible before `until`.
    pub(crate) fn hide_until(&mut self, until: DateTime<Utc>) {
        self.visible_at = ceil_to_millis(until);
    }
}

/// Newtype for item ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemId(pub i64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Visibility state of a stored item. Deletion is terminal and has no state
/// here: a deleted item no longer exists in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Eligible for dequeue and peek.
    Visible,
    /// Hidden until its lease expires.
    Leased,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Visibility::Visible => "visible",
            Visibility::Leased => "leased",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Dequeue mode
// ---------------------------------------------------------------------------

/// How `dequeue` treats the selected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DequeueMode {
    /// Delete on delivery. No redelivery if the consumer fails.
    #[default]
    Remove,
    /// Hide for the given duration. The item reappears unless deleted first.
    Lease(Duration),
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

/// Produces strictly ascending ids from clock readings.
///
/// An id is the clock reading in microseconds, bumped past the previous id
/// whenever the clock stalls or steps backwards. Seeding with the largest id
/// already in the store keeps ids ascending across reopen.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdGenerator {
    last: Option<i64>,
}

impl IdGenerator {
    pub(crate) fn new(seed: Option<ItemId>) -> Self {
        Self {
            last: seed.map(|id| id.0),
        }
    }

    pub(crate) fn next(&mut self, now: DateTime<Utc>) -> ItemId {
        let reading = now.timestamp_micros();
        let id = match self.last {
            Some(last) if reading <= last => last.saturating_add(1),
            _ => reading,
        };
        self.last = Some(id);
        ItemId(id)
    }
}

pub(crate) fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Round up to the next whole millisecond, saturating at the latest
/// representable millisecond.
pub(crate) fn ceil_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    let floor = truncate_to_millis(at);
    if floor == at {
        return at;
    }
    floor
        .checked_add_signed(TimeDelta::milliseconds(1))
        .unwrap_or(floor)
}
