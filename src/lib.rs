//! # porter-quotes
//!
//! Delivery quote retrieval for porter.in.
//!
//! A queue consumer pulls quote requests from a pgmq queue, drives the
//! site's estimate form through headless Chromium, and relays the quotes to a
//! downstream backend. The same fetcher also backs a synchronous HTTP endpoint.

pub mod config;
pub mod consumer;
pub mod error;
pub mod fetch;
pub mod model;
pub mod queue;
pub mod relay;
pub mod server;
pub mod telemetry;

pub use error::{Error, Result};
