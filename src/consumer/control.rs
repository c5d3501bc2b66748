//! Consumer loop: long-poll the queue, dispose of each message, acknowledge.
//!
//! The queue's visibility timeout is the only retry mechanism. A message that
//! is not deleted simply comes back later; no attempt state is kept here.

use super::disposition::Disposition;
use crate::error::Result;
use crate::fetch::QuoteFetcher;
use crate::model::{QuoteResult, WorkItem};
use crate::queue::{QueueClient, QueueMessage};
use crate::relay::{ResultRelay, SavePayload};
use crate::telemetry::message::{record_disposition, record_reference, start_message_span};
use crate::telemetry::metrics;
use futures::FutureExt;
use opentelemetry::KeyValue;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{Instrument, Span, debug, error, info, warn};

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Longest a single receive waits for a message.
    pub wait_time: Duration,
    /// Messages requested per receive.
    pub batch_size: u32,
    /// How long a received message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// Pause after a failed receive.
    pub error_backoff: Duration,
    /// Deliveries after which a message is dead-lettered. `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(20),
            batch_size: 1,
            visibility_timeout: Duration::from_secs(60),
            error_backoff: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

/// The consumer loop. Collaborators are passed in so any of them can be
/// substituted.
#[derive(Clone)]
pub struct QueueConsumer {
    queue: Arc<dyn QueueClient>,
    fetcher: Arc<dyn QuoteFetcher>,
    relay: Arc<dyn ResultRelay>,
    config: ConsumerConfig,
    shutdown: Arc<Notify>,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        fetcher: Arc<dyn QuoteFetcher>,
        relay: Arc<dyn ResultRelay>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            fetcher,
            relay,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the loop to stop. A message already being processed is
    /// finished first.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown, or until the queue reports an error that retrying
    /// cannot fix.
    pub async fn run(&self) -> Result<()> {
        info!(
            wait_secs = self.config.wait_time.as_secs(),
            max_attempts = ?self.config.max_attempts,
            "queue consumer started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("queue consumer shutting down");
                    return Ok(());
                }
                received = self.queue.receive(
                    self.config.batch_size,
                    self.config.wait_time,
                    self.config.visibility_timeout,
                ) => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) if e.is_fatal() => {
                    error!("queue unusable, stopping consumer: {e}");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        backoff_secs = self.config.error_backoff.as_secs(),
                        "receive failed: {e}"
                    );
                    tokio::select! {
                        _ = self.shutdown.notified() => {
                            info!("queue consumer shutting down");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.config.error_backoff) => continue,
                    }
                }
            };

            if messages.is_empty() {
                debug!("no messages, polling again");
                continue;
            }

            for message in &messages {
                self.handle(message).await;
            }
        }
    }

    /// Dispose of one message and act on the queue accordingly.
    async fn handle(&self, message: &QueueMessage) {
        let disposition = self.dispose(message).await;
        let result = match disposition {
            Disposition::DeadLettered { .. } => self.queue.archive(message.id).await,
            ref d if d.acknowledges() => self.queue.delete(message.id).await,
            _ => {
                info!(id = %message.id, "message left for redelivery after visibility timeout");
                return;
            }
        };
        match result {
            Ok(()) => debug!(id = %message.id, "message acknowledged"),
            // The message comes back and is processed again.
            Err(e) => error!(id = %message.id, "failed to acknowledge message: {e}"),
        }
    }

    /// Process one message. Returns `true` if it should be removed from the
    /// queue: either handled, or recognized as never processable.
    pub async fn process(&self, message: &QueueMessage) -> bool {
        self.dispose(message).await.acknowledges()
    }

    /// Process one message and report what became of it. Panics inside
    /// fetching or relaying are contained and become [`Disposition::Retry`].
    pub async fn dispose(&self, message: &QueueMessage) -> Disposition {
        let span = start_message_span(message.id.0, message.read_count);

        let disposition = AssertUnwindSafe(self.evaluate(message, &span))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Disposition::Retry {
                    reason: format!("internal fault: {reason}"),
                }
            });

        record_disposition(&span, disposition.label());
        metrics::message_dispositions()
            .add(1, &[KeyValue::new("disposition", disposition.label())]);
        span.in_scope(|| match disposition {
            Disposition::Completed { .. } | Disposition::NoQuotes => {
                info!(%disposition, "message processed")
            }
            Disposition::Dropped { .. } | Disposition::DeadLettered { .. } => {
                warn!(%disposition, "message removed without processing")
            }
            Disposition::Retry { .. } => warn!(%disposition, "message processing failed"),
        });

        disposition
    }

    async fn evaluate(&self, message: &QueueMessage, span: &Span) -> Disposition {
        if let Some(max) = self.config.max_attempts {
            if message.read_count > max {
                return Disposition::DeadLettered {
                    attempts: message.read_count,
                };
            }
        }

        let item = match WorkItem::decode(&message.body) {
            Ok(item) => item,
            Err(e) => {
                return Disposition::Dropped {
                    reason: e.to_string(),
                };
            }
        };
        if let Some(reference_id) = item.reference_id() {
            record_reference(span, reference_id);
        }

        let (request, reference) = match item.validate() {
            Ok(valid) => valid,
            Err(e) => {
                return Disposition::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        debug!(city = %request.city, service = %request.service_type, "fetching quotes");
        let quotes = match self.fetcher.fetch_quote(&request).await {
            QuoteResult::Success { quotes } => quotes,
            QuoteResult::Failure(failure) => {
                return Disposition::Retry {
                    reason: format!("fetch failed: {failure}"),
                };
            }
        };
        if quotes.is_empty() {
            return Disposition::NoQuotes;
        }

        let payload = SavePayload::new(&request, &reference);
        match self.relay.relay(&payload, &quotes).await {
            Ok(()) => Disposition::Completed {
                relayed: quotes.len(),
            },
            Err(e) => Disposition::Retry {
                reason: format!("relay failed: {e}"),
            },
        }
    }
}
