//! Queue message span helpers.

use tracing::Span;

/// Start a span for processing one delivery of a queue message.
///
/// `message.reference_id` and `message.disposition` are declared empty and
/// filled in as processing proceeds.
pub fn start_message_span(message_id: i64, read_count: u32) -> Span {
    tracing::info_span!(
        "queue.message",
        "message.id" = message_id,
        "message.read_count" = read_count,
        "message.reference_id" = tracing::field::Empty,
        "message.disposition" = tracing::field::Empty,
    )
}

pub fn record_reference(span: &Span, reference_id: &str) {
    span.record("message.reference_id", reference_id);
}

/// Record how the message was disposed of.
pub fn record_disposition(span: &Span, disposition: &str) {
    span.record("message.disposition", disposition);
}
