//! Browser fetch span helpers.

use tracing::Span;

/// Start a span for one quote fetch. `fetch.quotes` is filled in on success.
pub fn start_fetch_span(city: &str, service_type: &str) -> Span {
    tracing::info_span!(
        "porter.fetch",
        "fetch.id" = %uuid::Uuid::new_v4(),
        "fetch.city" = city,
        "fetch.service_type" = service_type,
        "fetch.quotes" = tracing::field::Empty,
    )
}

pub fn record_quote_count(span: &Span, count: usize) {
    span.record("fetch.quotes", count as u64);
}
