//! Queue consumer: polls for quote requests, fetches, relays, acknowledges.

pub mod control;
pub mod disposition;

pub use control::{ConsumerConfig, QueueConsumer};
pub use disposition::Disposition;
