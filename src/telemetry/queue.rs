//! Queue operation span helpers.

use tracing::Span;

use crate::model::{ItemId, Visibility};

/// Start a span for one queue operation.
///
/// The `item.id` field is declared empty and filled in once the operation
/// has selected or created an item.
pub fn start_queue_span(queue: &str, operation: &'static str) -> Span {
    tracing::debug_span!(
        "queue.op",
        "queue.name" = queue,
        "queue.operation" = operation,
        "item.id" = tracing::field::Empty,
    )
}

/// Attach the affected item to a queue span.
pub fn record_item(span: &Span, id: ItemId) {
    span.record("item.id", id.0);
}

/// Record a visibility transition event on the given span.
pub fn record_visibility_transition(span: &Span, from: Visibility, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = %from, to = to, "visibility_transition");
    });
}
