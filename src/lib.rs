//! # leaseq
//!
//! Durable single-process work queue with visibility-timeout leases.
//!
//! Producers enqueue opaque payloads. Consumers either remove items outright
//! or lease them: a leased item is hidden until its lease runs out and is then
//! delivered again unless it was deleted first. Queues are resolved by name
//! through a [`Registry`], each backed by its own store (SQLite by default).
//!
//! ```no_run
//! use leaseq::{DequeueMode, Registry};
//! use std::time::Duration;
//!
//! # fn main() -> leaseq::Result<()> {
//! let registry = Registry::in_memory();
//! let queue = registry.create("jobs")?;
//!
//! queue.enqueue("resize image 42")?;
//! if let Some(item) = queue.dequeue(DequeueMode::Lease(Duration::from_secs(60)))? {
//!     // ... do the work ...
//!     queue.delete(&item)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
pub use model::{DequeueMode, Item, ItemId, Visibility};
pub use queue::Queue;
pub use registry::{DEFAULT_QUEUE_NAME, Registry, RegistryBuilder};
