//! Quote fetching.
//!
//! A [`QuoteFetcher`] turns a validated request into a [`QuoteResult`]. It
//! never returns an error: every fault, whether a timeout, a missing element
//! or a browser crash, comes back as [`QuoteResult::Failure`] so callers can
//! treat all failures alike.

pub mod porter;
pub mod selectors;

use crate::model::{QuoteRequest, QuoteResult};
use async_trait::async_trait;

pub use porter::{FetcherConfig, PorterFetcher};

#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch_quote(&self, request: &QuoteRequest) -> QuoteResult;
}
