//! Downstream relay of fetched quotes.
//!
//! The relay performs a single attempt per call. Retrying is left to the
//! queue: a failed relay leaves the message unacknowledged.

pub mod http;

use crate::error::{Error, Result};
use crate::model::{Quote, QuoteRequest, Reference};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use http::HttpRelay;

/// How quotes are shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// One save request per quote, carrying `quote`.
    #[default]
    PerQuote,
    /// One save request per message, carrying `quotes`.
    Batch,
}

impl FromStr for RelayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_quote" => Ok(RelayMode::PerQuote),
            "batch" => Ok(RelayMode::Batch),
            other => Err(Error::Config(format!(
                "unknown relay mode '{other}' (expected per_quote or batch)"
            ))),
        }
    }
}

/// Identity, route and reference fields shared by every save request.
#[derive(Debug, Clone, Serialize)]
pub struct SavePayload<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub pickup_address: &'a str,
    pub drop_address: &'a str,
    pub city: &'a str,
    pub service_type: &'a str,
    pub reference_id: &'a str,
    pub reference_type: &'a str,
}

impl<'a> SavePayload<'a> {
    pub fn new(request: &'a QuoteRequest, reference: &'a Reference) -> Self {
        Self {
            name: &request.name,
            phone: request.phone.as_str(),
            pickup_address: &request.pickup_address,
            drop_address: &request.drop_address,
            city: request.city.as_str(),
            service_type: request.service_type.as_str(),
            reference_id: &reference.id,
            reference_type: &reference.kind,
        }
    }
}

/// Delivers fetched quotes to the downstream backend.
#[async_trait]
pub trait ResultRelay: Send + Sync {
    /// Relay all quotes for one request. `Ok` only if every quote was
    /// accepted; the first rejection is returned as the error.
    async fn relay(&self, payload: &SavePayload<'_>, quotes: &[Quote]) -> Result<()>;
}
