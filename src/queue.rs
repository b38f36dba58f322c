//! Lease engine. The public API for moving items through a named queue.
//!
//! A queue owns its store handle behind one instance lock. Every operation
//! takes that lock, so operations on one queue are serialized while different
//! queues proceed independently.
//!
//! Visibility is evaluated lazily: a leased item becomes deliverable again
//! simply because the clock has passed its `visible_at`. Nothing sweeps
//! expired leases in the background.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{Clock, offset};
use crate::error::{Error, Result};
use crate::model::{DequeueMode, IdGenerator, Item, ItemId, Visibility};
use crate::registry::RegistryShared;
use crate::storage::Store;
use crate::telemetry::metrics;
use crate::telemetry::queue::{record_item, record_visibility_transition, start_queue_span};

/// A named lease queue. Obtain one through [`crate::registry::Registry`].
pub struct Queue {
    name: String,
    default_lease: Duration,
    clock: Arc<dyn Clock>,
    /// `None` once disposed.
    state: Mutex<Option<QueueState>>,
    registry: Weak<RegistryShared>,
}

/// Everything guarded by the instance lock.
struct QueueState {
    store: Box<dyn Store>,
    ids: IdGenerator,
}

impl Queue {
    pub(crate) fn open(
        name: String,
        store: Box<dyn Store>,
        clock: Arc<dyn Clock>,
        default_lease: Duration,
        registry: Weak<RegistryShared>,
    ) -> Result<Self> {
        let ids = IdGenerator::new(store.max_id()?);
        Ok(Self {
            name,
            default_lease,
            clock,
            state: Mutex::new(Some(QueueState { store, ids })),
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lease applied by [`Queue::lease_next`].
    pub fn default_lease(&self) -> Duration {
        self.default_lease
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().is_none()
    }

    /// Append a payload. The new item is immediately visible.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) -> Result<ItemId> {
        let span = start_queue_span(&self.name, "enqueue");
        let _enter = span.enter();
        let started = Instant::now();

        let payload = payload.into();
        let id = self.with_state(|state| {
            let now = self.clock.now();
            let item = Item::new(state.ids.next(now), now, payload);
            state.store.insert(&item)?;
            Ok(item.id)
        })?;

        record_item(&span, id);
        trace!(id = %id, "enqueued");
        self.record("enqueue", started);
        Ok(id)
    }

    /// Deliver the earliest visible item, if any.
    ///
    /// [`DequeueMode::Remove`] deletes the item before returning it; a consumer
    /// that then fails loses it. [`DequeueMode::Lease`] hides it for the given
    /// duration instead; unless [`Queue::delete`] is called before the lease
    /// runs out, the item is delivered again.
    pub fn dequeue(&self, mode: DequeueMode) -> Result<Option<Item>> {
        let operation = match mode {
            DequeueMode::Remove => "dequeue",
            DequeueMode::Lease(_) => "lease",
        };
        let span = start_queue_span(&self.name, operation);
        let _enter = span.enter();
        let started = Instant::now();

        let delivered = self.with_state(|state| {
            let now = self.clock.now();
            let Some(mut item) = state.store.first_visible(now)? else {
                return Ok(None);
            };
            record_item(&span, item.id);

            match mode {
                DequeueMode::Remove => {
                    state.store.delete(item.id)?;
                    record_visibility_transition(&span, Visibility::Visible, "deleted");
                }
                DequeueMode::Lease(lease) => {
                    item.hide_until(offset(now, lease));
                    state.store.update(&item)?;
                    record_visibility_transition(&span, Visibility::Visible, "leased");
                }
            }
            Ok(Some(item))
        })?;

        if delivered.is_none() {
            trace!("no visible item");
        }
        self.record(
            if delivered.is_some() {
                operation
            } else {
                "dequeue_empty"
            },
            started,
        );
        Ok(delivered)
    }

    /// Lease the earliest visible item for the queue's default lease.
    pub fn lease_next(&self) -> Result<Option<Item>> {
        self.dequeue(DequeueMode::Lease(self.default_lease))
    }

    /// Payload of the earliest visible item, without touching it.
    pub fn peek(&self) -> Result<Option<Vec<u8>>> {
        let span = start_queue_span(&self.name, "peek");
        let _enter = span.enter();
        let started = Instant::now();

        let item = self.with_state(|state| state.store.first_visible(self.clock.now()))?;
        if let Some(ref item) = item {
            record_item(&span, item.id);
        }

        self.record("peek", started);
        Ok(item.map(|item| item.payload))
    }

    /// Re-lease an item: hide it until `now + lease`, updating `item` in place.
    ///
    /// Returns `false` if the item is no longer stored (already deleted or
    /// destructively dequeued). Nothing is written and `item` is left as is.
    pub fn invalidate(&self, item: &mut Item, lease: Duration) -> Result<bool> {
        let span = start_queue_span(&self.name, "invalidate");
        let _enter = span.enter();
        record_item(&span, item.id);
        let started = Instant::now();

        let updated = self.with_state(|state| {
            let now = self.clock.now();
            let mut leased = item.clone();
            leased.hide_until(offset(now, lease));
            let updated = state.store.update(&leased)?;
            if updated {
                record_visibility_transition(&span, item.visibility(now), "leased");
                *item = leased;
            }
            Ok(updated)
        })?;

        if !updated {
            debug!(id = %item.id, "invalidate on missing item");
        }
        self.record("invalidate", started);
        Ok(updated)
    }

    /// [`invalidate`](Self::invalidate) with the queue's default lease.
    pub fn invalidate_default(&self, item: &mut Item) -> Result<bool> {
        self.invalidate(item, self.default_lease)
    }

    /// Acknowledge an item, removing it for good.
    ///
    /// Returns `false` if it was already gone.
    pub fn delete(&self, item: &Item) -> Result<bool> {
        let span = start_queue_span(&self.name, "delete");
        let _enter = span.enter();
        record_item(&span, item.id);
        let started = Instant::now();

        let removed = self.with_state(|state| state.store.delete(item.id))?;

        if !removed {
            debug!(id = %item.id, "delete on missing item");
        }
        self.record("delete", started);
        Ok(removed)
    }

    /// Number of stored items, visible or leased.
    pub fn len(&self) -> Result<usize> {
        self.with_state(|state| state.store.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove this queue from its registry and close the store.
    ///
    /// Idempotent. Every later operation fails with [`Error::Disposed`].
    pub fn dispose(&self) {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self),
            None => self.release(),
        }
    }

    /// Drop the store handle. Called with the registry lock held when the
    /// queue is still registered.
    pub(crate) fn release(&self) {
        if self.state.lock().take().is_some() {
            debug!(queue = %self.name, "queue released");
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut QueueState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| Error::Disposed(self.name.clone()))?;
        f(state)
    }

    fn record(&self, operation: &'static str, started: Instant) {
        metrics::record_queue_operation(&self.name, operation);
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", operation)],
        );
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("default_lease", &self.default_lease)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::DateTime;

    fn standalone(clock: &ManualClock) -> Queue {
        Queue::open(
            "unit".to_string(),
            Box::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            Duration::from_secs(30),
            Weak::new(),
        )
        .unwrap()
    }

    #[test]
    fn ids_seed_from_existing_store_contents() {
        let clock = ManualClock::starting_now();
        let mut store = MemoryStore::new();
        let far = ItemId(clock.now().timestamp_micros() + 10_000_000);
        store
            .insert(&Item::new(far, clock.now(), b"old".to_vec()))
            .unwrap();

        let queue = Queue::open(
            "seeded".to_string(),
            Box::new(store),
            Arc::new(clock.clone()),
            Duration::from_secs(30),
            Weak::new(),
        )
        .unwrap();

        assert!(queue.enqueue("new").unwrap() > far);
    }

    #[test]
    fn dispose_without_registry_still_releases() {
        let clock = ManualClock::starting_now();
        let queue = standalone(&clock);

        queue.dispose();

        assert!(queue.is_disposed());
        assert!(matches!(queue.peek(), Err(Error::Disposed(_))));
    }

    #[test]
    fn invalidate_moves_visibility_from_now() {
        let clock = ManualClock::new(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap());
        let queue = standalone(&clock);
        queue.enqueue("a").unwrap();

        let mut item = queue
            .dequeue(DequeueMode::Lease(Duration::from_secs(5)))
            .unwrap()
            .unwrap();
        clock.advance(Duration::from_secs(4));
        assert!(queue.invalidate(&mut item, Duration::from_secs(5)).unwrap());

        clock.advance(Duration::from_secs(2));
        assert!(queue.peek().unwrap().is_none());
        assert_eq!(item.visibility(clock.now()), Visibility::Leased);

        clock.advance(Duration::from_secs(3));
        assert_eq!(queue.peek().unwrap().unwrap(), b"a");
    }

    #[test]
    fn failed_invalidate_leaves_item_untouched() {
        let clock = ManualClock::starting_now();
        let queue = standalone(&clock);
        queue.enqueue("a").unwrap();

        let mut item = queue.dequeue(DequeueMode::Remove).unwrap().unwrap();
        let before = item.clone();

        assert!(!queue.invalidate(&mut item, Duration::from_secs(5)).unwrap());
        assert_eq!(item, before);
    }
}
