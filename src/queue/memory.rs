//! In-process queue with pgmq's delivery semantics, for tests and local runs.

use super::{MessageId, QueueClient, QueueMessage};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Entry {
    id: MessageId,
    body: String,
    read_count: u32,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
}

/// Acknowledgement log entries kept per log; older ids are forgotten.
const LOG_CAP: usize = 1024;

fn log_id(log: &mut Vec<MessageId>, id: MessageId) {
    if log.len() >= LOG_CAP {
        log.remove(0);
    }
    log.push(id);
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    live: Vec<Entry>,
    deleted: Vec<MessageId>,
    archived: Vec<MessageId>,
}

/// A queue held in memory. Time is tokio time, so tests may pause it.
///
/// Meant for tests and short local runs: nothing is persisted, and the
/// delete and archive logs keep only the most recent ids.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    arrived: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a raw body, which need not be valid JSON.
    pub fn push_raw(&self, body: impl Into<String>) -> MessageId {
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = MessageId(inner.next_id);
            inner.live.push(Entry {
                id,
                body: body.into(),
                read_count: 0,
                enqueued_at: Utc::now(),
                visible_at: Instant::now(),
            });
            id
        };
        self.arrived.notify_waiters();
        id
    }

    /// Messages still in the live queue, visible or not.
    pub fn pending(&self) -> usize {
        self.lock().live.len()
    }

    /// Most recently acknowledged ids, in order, repeats included.
    pub fn deleted(&self) -> Vec<MessageId> {
        self.lock().deleted.clone()
    }

    /// Most recent ids moved to the dead-letter store.
    pub fn archived(&self) -> Vec<MessageId> {
        self.lock().archived.clone()
    }

    /// Deliveries so far of a live message.
    pub fn read_count(&self, id: MessageId) -> Option<u32> {
        self.lock()
            .live
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.read_count)
    }

    /// Claim visible messages, or report when the next one becomes visible.
    fn try_claim(
        &self,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> (Vec<QueueMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut inner = self.lock();
        let mut claimed = Vec::new();
        for entry in inner.live.iter_mut() {
            if claimed.len() as u32 >= max_messages {
                break;
            }
            if entry.visible_at <= now {
                entry.read_count += 1;
                entry.visible_at = now + visibility_timeout;
                claimed.push(QueueMessage {
                    id: entry.id,
                    read_count: entry.read_count,
                    enqueued_at: entry.enqueued_at,
                    body: entry.body.clone(),
                });
            }
        }
        let next_visible = inner.live.iter().map(|e| e.visible_at).min();
        (claimed, next_visible)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn receive(
        &self,
        max_messages: u32,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + wait;
        loop {
            let arrived = self.arrived.notified();
            let (claimed, next_visible) = self.try_claim(max_messages, visibility_timeout);
            if !claimed.is_empty() {
                return Ok(claimed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = match next_visible {
                Some(at) if at > now => at.min(deadline),
                _ => deadline,
            };
            tokio::select! {
                _ = arrived => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let mut inner = self.lock();
        inner.live.retain(|e| e.id != id);
        log_id(&mut inner.deleted, id);
        Ok(())
    }

    async fn archive(&self, id: MessageId) -> Result<()> {
        let mut inner = self.lock();
        inner.live.retain(|e| e.id != id);
        log_id(&mut inner.archived, id);
        Ok(())
    }

    async fn send(&self, body: &serde_json::Value) -> Result<MessageId> {
        Ok(self.push_raw(body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn received_message_is_invisible_until_timeout() {
        tokio::time::pause();
        let queue = MemoryQueue::new();
        let id = queue.push_raw("{}");

        let first = queue.receive(1, Duration::ZERO, VT).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);
        assert_eq!(first[0].read_count, 1);

        let hidden = queue.receive(1, Duration::ZERO, VT).await.unwrap();
        assert!(hidden.is_empty());

        tokio::time::advance(VT).await;
        let again = queue.receive(1, Duration::ZERO, VT).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].read_count, 2);
    }

    #[tokio::test]
    async fn deleted_message_is_never_redelivered() {
        tokio::time::pause();
        let queue = MemoryQueue::new();
        let id = queue.push_raw("{}");
        let msgs = queue.receive(1, Duration::ZERO, VT).await.unwrap();
        queue.delete(msgs[0].id).await.unwrap();

        tokio::time::advance(VT * 2).await;
        assert!(queue.receive(1, Duration::ZERO, VT).await.unwrap().is_empty());
        assert_eq!(queue.deleted(), vec![id]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn long_poll_wakes_on_send() {
        tokio::time::pause();
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let producer = std::sync::Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            producer.send(&serde_json::json!({"k": 1})).await.unwrap();
        });

        let msgs = queue.receive(1, Duration::from_secs(20), VT).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].body, r#"{"k":1}"#);
    }

    #[tokio::test]
    async fn long_poll_times_out_empty() {
        tokio::time::pause();
        let queue = MemoryQueue::new();
        let msgs = queue.receive(1, Duration::from_secs(20), VT).await.unwrap();
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn batch_receive_respects_limit() {
        let queue = MemoryQueue::new();
        for _ in 0..3 {
            queue.push_raw("{}");
        }
        let msgs = queue.receive(2, Duration::ZERO, VT).await.unwrap();
        assert_eq!(msgs.len(), 2);
        let rest = queue.receive(2, Duration::ZERO, VT).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn acknowledgement_logs_keep_only_recent_ids() {
        let queue = MemoryQueue::new();
        let total = LOG_CAP as i64 + 10;
        for n in 1..=total {
            queue.delete(MessageId(n)).await.unwrap();
            queue.archive(MessageId(n)).await.unwrap();
        }

        let deleted = queue.deleted();
        assert_eq!(deleted.len(), LOG_CAP);
        assert_eq!(deleted.first(), Some(&MessageId(11)));
        assert_eq!(deleted.last(), Some(&MessageId(total)));
        assert_eq!(queue.archived().len(), LOG_CAP);
    }
}
