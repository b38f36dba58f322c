//! Registry of live named queues.
//!
//! The registry guarantees at most one live [`Queue`] per name. All lookups,
//! inserts and removals run under a single lock, so two concurrent
//! `create_new` calls for the same name can never both succeed, and a store
//! is never opened twice for the same name.
//!
//! A registry is an ordinary value: construct one, clone it to share it, and
//! when the last clone is dropped every queue it still holds is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::storage::{SqliteOpener, StoreLocation, StoreOpener};
use crate::telemetry::metrics::record_registry_operation;

/// Reserved name of the queue returned by [`Registry::default_queue`].
pub const DEFAULT_QUEUE_NAME: &str = "persistentQueue";

const MAX_NAME_LEN: usize = 128;
const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Shared handle to a set of named queues.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<RegistryShared>,
}

pub(crate) struct RegistryShared {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    opener: Box<dyn StoreOpener>,
    clock: Arc<dyn Clock>,
    default_lease: Duration,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry whose queues live in private in-memory databases.
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// Registry backed by the store location and lease set in `config`.
    pub fn from_config(config: &Config) -> Self {
        let location = match &config.data_dir {
            Some(dir) => StoreLocation::Directory(dir.clone()),
            None => StoreLocation::InMemory,
        };
        Self::builder()
            .opener(SqliteOpener::new(location, config.busy_timeout))
            .default_lease(config.default_lease)
            .build()
    }

    /// Get the queue registered as `name`, opening it if needed.
    pub fn create(&self, name: &str) -> Result<Arc<Queue>> {
        validate_name(name)?;
        let mut queues = self.shared.queues.lock();

        if let Some(queue) = queues.get(name) {
            record_registry_operation("create", "existing");
            return Ok(Arc::clone(queue));
        }

        let queue = self.open_queue(name)?;
        queues.insert(name.to_string(), Arc::clone(&queue));
        record_registry_operation("create", "created");
        Ok(queue)
    }

    /// Open and register `name`, failing if it is already registered.
    pub fn create_new(&self, name: &str) -> Result<Arc<Queue>> {
        validate_name(name)?;
        let mut queues = self.shared.queues.lock();

        if queues.contains_key(name) {
            record_registry_operation("create_new", "conflict");
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let queue = self.open_queue(name)?;
        queues.insert(name.to_string(), Arc::clone(&queue));
        record_registry_operation("create_new", "created");
        Ok(queue)
    }

    /// The well-known queue named [`DEFAULT_QUEUE_NAME`].
    pub fn default_queue(&self) -> Result<Arc<Queue>> {
        self.create(DEFAULT_QUEUE_NAME)
    }

    /// Exclusive creation of the well-known queue.
    pub fn create_new_default(&self) -> Result<Arc<Queue>> {
        self.create_new(DEFAULT_QUEUE_NAME)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared.queues.lock().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispose every registered queue.
    pub fn dispose_all(&self) {
        let mut queues = self.shared.queues.lock();
        for (_, queue) in queues.drain() {
            queue.release();
        }
    }

    fn open_queue(&self, name: &str) -> Result<Arc<Queue>> {
        let store = self.shared.opener.open(name)?;
        let queue = Queue::open(
            name.to_string(),
            store,
            Arc::clone(&self.shared.clock),
            self.shared.default_lease,
            Arc::downgrade(&self.shared),
        )?;
        info!(queue = name, "queue opened");
        Ok(Arc::new(queue))
    }
}

impl RegistryShared {
    /// Unregister `queue` if it is still the live instance for its name, then
    /// close its store. The store is closed before the lock is released so a
    /// replacement instance never overlaps with the old handle.
    pub(crate) fn remove(&self, queue: &Queue) {
        let mut queues = self.queues.lock();
        let registered = queues
            .get(queue.name())
            .is_some_and(|live| std::ptr::eq(Arc::as_ptr(live), queue));
        if registered {
            queues.remove(queue.name());
            record_registry_operation("remove", "removed");
            info!(queue = queue.name(), "queue disposed");
        }
        queue.release();
    }
}

impl Drop for RegistryShared {
    fn drop(&mut self) {
        for (_, queue) in self.queues.get_mut().drain() {
            queue.release();
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("queues", &self.names())
            .field("default_lease", &self.shared.default_lease)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Registry`]. Defaults: in-memory SQLite stores, system clock,
/// 30 second lease.
pub struct RegistryBuilder {
    opener: Box<dyn StoreOpener>,
    clock: Arc<dyn Clock>,
    default_lease: Duration,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            opener: Box::new(SqliteOpener::in_memory()),
            clock: Arc::new(SystemClock),
            default_lease: DEFAULT_LEASE,
        }
    }
}

impl RegistryBuilder {
    pub fn opener(mut self, opener: impl StoreOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            shared: Arc::new(RegistryShared {
                queues: Mutex::new(HashMap::new()),
                opener: self.opener,
                clock: self.clock,
                default_lease: self.default_lease,
            }),
        }
    }
}

/// Names become file names, so keep them to a portable character set.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
