//! Metric instrument factories for porter-quotes.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"porter-quotes"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("porter-quotes")
}

/// Counter: queue-level operations (create, send, read, delete, archive).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("porter.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: processed messages by outcome.
/// Labels: `disposition` ("completed" | "no_quotes" | "dropped" | "dead_lettered" | "retry").
pub fn message_dispositions() -> Counter<u64> {
    meter()
        .u64_counter("porter.messages.processed")
        .with_description("Queue messages processed, by disposition")
        .build()
}

/// Counter: quote fetches.
/// Labels: `result` ("success" | "failure").
pub fn fetch_results() -> Counter<u64> {
    meter()
        .u64_counter("porter.fetch.results")
        .with_description("Quote fetch attempts")
        .build()
}

/// Histogram: wall time of one browser fetch in milliseconds.
pub fn fetch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("porter.fetch.duration_ms")
        .with_description("Quote fetch duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: save requests sent downstream.
/// Labels: `mode`, `result` ("ok" | "rejected" | "transport_error").
pub fn relay_requests() -> Counter<u64> {
    meter()
        .u64_counter("porter.relay.requests")
        .with_description("Save requests sent to the downstream backend")
        .build()
}
