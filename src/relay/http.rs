//! HTTP relay to the quote-saving backend.

use super::{RelayMode, ResultRelay, SavePayload};
use crate::error::{Error, Result};
use crate::model::Quote;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SingleQuote<'a> {
    #[serde(flatten)]
    base: &'a SavePayload<'a>,
    quote: &'a Quote,
}

#[derive(Serialize)]
struct QuoteBatch<'a> {
    #[serde(flatten)]
    base: &'a SavePayload<'a>,
    quotes: &'a [Quote],
}

/// Posts quotes as JSON to `{base_url}/save-quote` or `{base_url}/save-quotes`.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    base_url: String,
    mode: RelayMode,
}

impl HttpRelay {
    pub fn new(base_url: impl Into<String>, mode: RelayMode) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mode,
        })
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        let result = self.client.post(&url).json(body).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                record(self.mode, "transport_error");
                return Err(Error::Http(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            record(self.mode, "ok");
            debug!(%url, status = status.as_u16(), "relay accepted");
            return Ok(());
        }

        record(self.mode, "rejected");
        let body = response.text().await.unwrap_or_default();
        warn!(%url, status = status.as_u16(), %body, "relay rejected");
        Err(Error::Relay {
            status: status.as_u16(),
            body,
        })
    }
}

fn record(mode: RelayMode, result: &'static str) {
    let mode = match mode {
        RelayMode::PerQuote => "per_quote",
        RelayMode::Batch => "batch",
    };
    metrics::relay_requests().add(
        1,
        &[KeyValue::new("mode", mode), KeyValue::new("result", result)],
    );
}

#[async_trait]
impl ResultRelay for HttpRelay {
    async fn relay(&self, payload: &SavePayload<'_>, quotes: &[Quote]) -> Result<()> {
        match self.mode {
            RelayMode::PerQuote => {
                for quote in quotes {
                    self.post("/save-quote", &SingleQuote { base: payload, quote })
                        .await
                        .inspect_err(|_| {
                            warn!(vehicle = %quote.vehicle_name, "stopping relay after failed save")
                        })?;
                }
                Ok(())
            }
            RelayMode::Batch => {
                self.post("/save-quotes", &QuoteBatch { base: payload, quotes })
                    .await
            }
        }
    }
}
