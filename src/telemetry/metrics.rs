//! Metric instrument factories for leaseq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for leaseq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("leaseq")
}

/// Counter: queue-level operations (enqueue, dequeue, lease, peek, ...).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: registry operations (create, create_new, remove).
/// Labels: `operation`, `result` ("created" | "existing" | "conflict" | "removed").
pub fn registry_operations() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.registry.operations")
        .with_description("Number of queue registry operations")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("leaseq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Count one queue operation.
pub(crate) fn record_queue_operation(queue: &str, operation: &'static str) {
    queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

/// Count one registry operation.
pub(crate) fn record_registry_operation(operation: &'static str, result: &'static str) {
    registry_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
}
