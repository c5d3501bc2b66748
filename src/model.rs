//! Core data model.
//!
//! A work item is one quote request as it arrives on the queue. Once its
//! required fields are present and its identity fields validate, it becomes a
//! [`QuoteRequest`] plus the producer's [`Reference`]. Fetching yields a
//! [`QuoteResult`].

pub mod quote;
pub mod request;

pub use quote::{Quote, QuoteFailure, QuoteResult, parse_capacity, parse_price_range};
pub use request::{City, Phone, QuoteRequest, QuoteRequestBody, Reference, ServiceType, WorkItem};
