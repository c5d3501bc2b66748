//! At-least-once work queue.
//!
//! A received message stays invisible to other consumers until its visibility
//! timeout lapses; if it has not been deleted by then it is delivered again.
//! Deleting is the only acknowledgement.

pub mod memory;
pub mod pgmq;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use memory::MemoryQueue;
pub use pgmq::PgmqQueue;

/// Identifier used to acknowledge or dead-letter a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivery of a queued message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: MessageId,
    /// How many times this message has been delivered, this delivery included.
    pub read_count: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Raw body. Decoding is the consumer's job.
    pub body: String,
}

/// A queue the consumer can poll.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max_messages`, waiting at most `wait` for the
    /// first to become available. Received messages stay invisible for
    /// `visibility_timeout`.
    async fn receive(
        &self,
        max_messages: u32,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a message so it is never delivered again.
    async fn delete(&self, id: MessageId) -> Result<()>;

    /// Move a message out of the live queue into the dead-letter store.
    async fn archive(&self, id: MessageId) -> Result<()>;

    /// Enqueue a message body. Returns its id.
    async fn send(&self, body: &serde_json::Value) -> Result<MessageId>;
}
