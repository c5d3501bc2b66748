//! Integration tests for the queue consumer against the in-memory queue.

use async_trait::async_trait;
use porter_quotes::consumer::{ConsumerConfig, Disposition, QueueConsumer};
use porter_quotes::fetch::QuoteFetcher;
use porter_quotes::model::{Quote, QuoteFailure, QuoteRequest, QuoteResult};
use porter_quotes::queue::{MemoryQueue, MessageId, QueueClient, QueueMessage};
use porter_quotes::relay::{HttpRelay, RelayMode, ResultRelay, SavePayload};
use porter_quotes::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

enum Behavior {
    Quotes(Vec<Quote>),
    Fail,
    Panic,
}

struct StubFetcher {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubFetcher {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteFetcher for StubFetcher {
    async fn fetch_quote(&self, _request: &QuoteRequest) -> QuoteResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Quotes(quotes) => QuoteResult::Success {
                quotes: quotes.clone(),
            },
            Behavior::Fail => QuoteFailure::new("Timed out waiting for page").into(),
            Behavior::Panic => panic!("browser handler went away"),
        }
    }
}

/// Records every relayed batch. Fails if `fail` is set.
struct StubRelay {
    fail: bool,
    relayed: Mutex<Vec<(String, usize)>>,
}

impl StubRelay {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            relayed: Mutex::new(Vec::new()),
        })
    }

    fn relayed(&self) -> Vec<(String, usize)> {
        self.relayed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultRelay for StubRelay {
    async fn relay(&self, payload: &SavePayload<'_>, quotes: &[Quote]) -> Result<()> {
        if self.fail {
            return Err(Error::Relay {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.relayed
            .lock()
            .unwrap()
            .push((payload.reference_id.to_string(), quotes.len()));
        Ok(())
    }
}

fn two_quotes() -> Vec<Quote> {
    vec![
        Quote::from_card("Tata Ace", "₹585 - ₹615", "750 kg"),
        Quote::from_card("Pickup 8ft", "₹900", "1250 kg"),
    ]
}

fn valid_body(reference_id: &str) -> serde_json::Value {
    json!({
        "name": "Asha",
        "phone": "9876543210",
        "pickup_address": "Connaught Place, New Delhi",
        "drop_address": "Cyber City, Gurugram",
        "city": "Delhi",
        "service_type": "trucks",
        "reference_id": reference_id,
        "reference_type": "order",
    })
}

fn message(body: impl Into<String>) -> QueueMessage {
    QueueMessage {
        id: MessageId(1),
        read_count: 1,
        enqueued_at: chrono::Utc::now(),
        body: body.into(),
    }
}

fn consumer(
    queue: Arc<MemoryQueue>,
    fetcher: Arc<StubFetcher>,
    relay: Arc<StubRelay>,
    config: ConsumerConfig,
) -> QueueConsumer {
    QueueConsumer::new(queue, fetcher, relay, config)
}

fn fast_config() -> ConsumerConfig {
    ConsumerConfig {
        wait_time: Duration::from_millis(50),
        visibility_timeout: Duration::from_secs(60),
        error_backoff: Duration::from_millis(10),
        ..ConsumerConfig::default()
    }
}

// ---------------------------------------------------------------------------
// process: acknowledgement decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_required_fields_acknowledge_without_fetching() {
    for field in [
        "pickup_address",
        "drop_address",
        "reference_id",
        "reference_type",
    ] {
        let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
        let c = consumer(
            Arc::new(MemoryQueue::new()),
            fetcher.clone(),
            StubRelay::new(false),
            fast_config(),
        );

        let mut body = valid_body("abc123");
        body.as_object_mut().unwrap().remove(field);
        assert!(c.process(&message(body.to_string())).await, "{field}");

        body[field] = json!("   ");
        assert!(c.process(&message(body.to_string())).await, "blank {field}");

        assert_eq!(fetcher.calls(), 0, "{field}");
    }
}

#[tokio::test]
async fn malformed_body_is_acknowledged() {
    let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        fetcher.clone(),
        StubRelay::new(false),
        fast_config(),
    );

    for body in ["not json", "{\"pickup_address\": ", "[1, 2, 3]", ""] {
        let disposition = c.dispose(&message(body)).await;
        assert!(matches!(disposition, Disposition::Dropped { .. }), "{body:?}");
    }
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn invalid_phone_or_city_is_dropped() {
    let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        fetcher.clone(),
        StubRelay::new(false),
        fast_config(),
    );

    let mut bad_phone = valid_body("abc123");
    bad_phone["phone"] = json!("987-654-3210");
    assert!(c.process(&message(bad_phone.to_string())).await);

    let mut bad_city = valid_body("abc123");
    bad_city["city"] = json!("Atlantis");
    assert!(c.process(&message(bad_city.to_string())).await);

    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn empty_quotes_acknowledge_without_relaying() {
    let relay = StubRelay::new(false);
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Quotes(Vec::new())),
        relay.clone(),
        fast_config(),
    );

    let disposition = c.dispose(&message(valid_body("abc123").to_string())).await;
    assert_eq!(disposition, Disposition::NoQuotes);
    assert!(relay.relayed().is_empty());
}

#[tokio::test]
async fn fetch_failure_is_retried() {
    let relay = StubRelay::new(false);
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Fail),
        relay.clone(),
        fast_config(),
    );

    assert!(!c.process(&message(valid_body("abc123").to_string())).await);
    assert!(relay.relayed().is_empty());
}

#[tokio::test]
async fn relay_failure_retries_the_whole_item() {
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Quotes(two_quotes())),
        StubRelay::new(true),
        fast_config(),
    );

    let disposition = c.dispose(&message(valid_body("abc123").to_string())).await;
    assert!(matches!(disposition, Disposition::Retry { .. }));
}

#[tokio::test]
async fn rejection_after_an_accepted_save_retries_the_whole_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save-quote"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/save-quote"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let relay = HttpRelay::new(server.uri(), RelayMode::PerQuote).unwrap();
    let c = QueueConsumer::new(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Quotes(two_quotes())),
        Arc::new(relay),
        fast_config(),
    );

    let disposition = c.dispose(&message(valid_body("abc123").to_string())).await;
    assert!(matches!(disposition, Disposition::Retry { .. }), "{disposition:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn relayed_quotes_are_acknowledged() {
    let relay = StubRelay::new(false);
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Quotes(two_quotes())),
        relay.clone(),
        fast_config(),
    );

    let disposition = c.dispose(&message(valid_body("abc123").to_string())).await;
    assert_eq!(disposition, Disposition::Completed { relayed: 2 });
    assert_eq!(relay.relayed(), vec![("abc123".to_string(), 2)]);
}

#[tokio::test]
async fn panic_in_fetch_is_contained_and_retried() {
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        StubFetcher::new(Behavior::Panic),
        StubRelay::new(false),
        fast_config(),
    );

    match c.dispose(&message(valid_body("abc123").to_string())).await {
        Disposition::Retry { reason } => assert!(reason.contains("browser handler went away")),
        other => panic!("expected Retry, got {other:?}"),
    }
}

#[tokio::test]
async fn over_limit_delivery_is_dead_lettered_without_fetching() {
    let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
    let c = consumer(
        Arc::new(MemoryQueue::new()),
        fetcher.clone(),
        StubRelay::new(false),
        ConsumerConfig {
            max_attempts: Some(3),
            ..fast_config()
        },
    );

    let mut msg = message(valid_body("abc123").to_string());
    msg.read_count = 3;
    assert_eq!(
        c.dispose(&msg).await,
        Disposition::Completed { relayed: 2 }
    );

    msg.read_count = 4;
    assert_eq!(
        c.dispose(&msg).await,
        Disposition::DeadLettered { attempts: 4 }
    );
    assert_eq!(fetcher.calls(), 1);
}

// ---------------------------------------------------------------------------
// run: end to end through the queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn well_formed_message_is_deleted_exactly_once() {
    let queue = Arc::new(MemoryQueue::new());
    let relay = StubRelay::new(false);
    let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
    let id = queue.send(&valid_body("abc123")).await.unwrap();

    let c = consumer(queue.clone(), fetcher.clone(), relay.clone(), fast_config());
    let runner = {
        let c = c.clone();
        tokio::spawn(async move { c.run().await })
    };

    // Wait for the acknowledgement, then give the loop a few more polls.
    for _ in 0..100 {
        if !queue.deleted().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    c.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(queue.deleted(), vec![id]);
    assert_eq!(queue.pending(), 0);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(relay.relayed(), vec![("abc123".to_string(), 2)]);
}

#[tokio::test]
async fn batch_is_processed_in_order_one_message_at_a_time() {
    let queue = Arc::new(MemoryQueue::new());
    let fetcher = StubFetcher::new(Behavior::Quotes(two_quotes()));
    let relay = StubRelay::new(false);
    let first = queue.send(&valid_body("first")).await.unwrap();
    let garbage = queue.push_raw("garbage");
    let last = queue.send(&valid_body("last")).await.unwrap();

    let c = consumer(
        queue.clone(),
        fetcher.clone(),
        relay.clone(),
        ConsumerConfig {
            batch_size: 3,
            ..fast_config()
        },
    );
    let runner = {
        let c = c.clone();
        tokio::spawn(async move { c.run().await })
    };

    for _ in 0..100 {
        if queue.deleted().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    c.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(queue.deleted(), vec![first, garbage, last]);
    assert_eq!(queue.pending(), 0);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
        relay.relayed(),
        vec![("first".to_string(), 2), ("last".to_string(), 2)]
    );
}

#[tokio::test]
async fn failed_message_is_redelivered_after_visibility_timeout() {
    tokio::time::pause();
    let queue = Arc::new(MemoryQueue::new());
    let fetcher = StubFetcher::new(Behavior::Fail);
    let id = queue.send(&valid_body("abc123")).await.unwrap();

    let c = consumer(
        queue.clone(),
        fetcher.clone(),
        StubRelay::new(false),
        ConsumerConfig {
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(60),
            ..ConsumerConfig::default()
        },
    );
    let runner = {
        let c = c.clone();
        tokio::spawn(async move { c.run().await })
    };

    // Paused time auto-advances while every task is idle.
    tokio::time::sleep(Duration::from_secs(150)).await;
    c.shutdown();
    runner.await.unwrap().unwrap();

    assert!(queue.deleted().is_empty());
    assert_eq!(queue.pending(), 1);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(queue.read_count(id), Some(3));
}

#[tokio::test]
async fn exhausted_message_is_archived() {
    tokio::time::pause();
    let queue = Arc::new(MemoryQueue::new());
    let fetcher = StubFetcher::new(Behavior::Fail);
    let id = queue.send(&valid_body("abc123")).await.unwrap();

    let c = consumer(
        queue.clone(),
        fetcher.clone(),
        StubRelay::new(false),
        ConsumerConfig {
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(60),
            max_attempts: Some(2),
            ..ConsumerConfig::default()
        },
    );
    let runner = {
        let c = c.clone();
        tokio::spawn(async move { c.run().await })
    };

    tokio::time::sleep(Duration::from_secs(300)).await;
    c.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(queue.archived(), vec![id]);
    assert!(queue.deleted().is_empty());
    assert_eq!(queue.pending(), 0);
    assert_eq!(fetcher.calls(), 2);
}

// ---------------------------------------------------------------------------
// run: receive errors
// ---------------------------------------------------------------------------

/// A queue whose receive always fails with the given error.
struct BrokenQueue {
    fatal: bool,
    receives: AtomicUsize,
}

#[async_trait]
impl QueueClient for BrokenQueue {
    async fn receive(
        &self,
        _max_messages: u32,
        _wait: Duration,
        _visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.fatal {
            Err(Error::Config("queue does not exist".to_string()))
        } else {
            Err(Error::Other("connection reset".to_string()))
        }
    }

    async fn delete(&self, _id: MessageId) -> Result<()> {
        Ok(())
    }

    async fn archive(&self, _id: MessageId) -> Result<()> {
        Ok(())
    }

    async fn send(&self, _body: &serde_json::Value) -> Result<MessageId> {
        Ok(MessageId(1))
    }
}

#[tokio::test]
async fn fatal_receive_error_stops_the_loop() {
    let queue = Arc::new(BrokenQueue {
        fatal: true,
        receives: AtomicUsize::new(0),
    });
    let c = QueueConsumer::new(
        queue.clone(),
        StubFetcher::new(Behavior::Fail),
        StubRelay::new(false),
        fast_config(),
    );

    assert!(matches!(c.run().await, Err(Error::Config(_))));
    assert_eq!(queue.receives.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_receive_error_backs_off_and_continues() {
    tokio::time::pause();
    let queue = Arc::new(BrokenQueue {
        fatal: false,
        receives: AtomicUsize::new(0),
    });
    let c = QueueConsumer::new(
        queue.clone(),
        StubFetcher::new(Behavior::Fail),
        StubRelay::new(false),
        ConsumerConfig {
            error_backoff: Duration::from_secs(10),
            ..ConsumerConfig::default()
        },
    );
    let runner = {
        let c = c.clone();
        tokio::spawn(async move { c.run().await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    c.shutdown();
    runner.await.unwrap().unwrap();

    // Receives at t=0, 10 and 20.
    assert_eq!(queue.receives.load(Ordering::SeqCst), 3);
}
