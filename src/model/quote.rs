//! Quotes and fetch results.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern is a valid regex"));

/// Parse a displayed price like `"₹585 - ₹615"` into `(min, max)`.
///
/// One number gives a point price; anything else gives `(None, None)`.
pub fn parse_price_range(text: &str) -> (Option<i64>, Option<i64>) {
    let cleaned = text.replace(',', "");
    let numbers: Vec<&str> = DIGITS.find_iter(&cleaned).map(|m| m.as_str()).collect();
    match numbers.as_slice() {
        [low, high] => (low.parse().ok(), high.parse().ok()),
        [only] => {
            let n = only.parse().ok();
            (n, n)
        }
        _ => (None, None),
    }
}

/// Parse a displayed capacity like `"500 kg"` into kilograms.
pub fn parse_capacity(text: &str) -> Option<i64> {
    let cleaned = text.replace(',', "");
    DIGITS
        .find(&cleaned)
        .and_then(|m| m.as_str().parse().ok())
}

/// One vehicle offer from the estimate results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub vehicle_name: String,
    /// Price text as displayed.
    pub price_range: String,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Capacity text as displayed.
    pub capacity: String,
    pub capacity_kg: Option<i64>,
}

impl Quote {
    /// Build a quote from the raw card text, parsing the numeric fields.
    pub fn from_card(
        vehicle_name: impl Into<String>,
        price_range: impl Into<String>,
        capacity: impl Into<String>,
    ) -> Self {
        let price_range = price_range.into();
        let capacity = capacity.into();
        let (min_price, max_price) = parse_price_range(&price_range);
        let capacity_kg = parse_capacity(&capacity);
        Self {
            vehicle_name: vehicle_name.into(),
            price_range,
            min_price,
            max_price,
            capacity,
            capacity_kg,
        }
    }
}

const DEFAULT_SUGGESTION: &str =
    "Try the request again; if the problem persists the site layout may have changed";

/// A structured fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFailure {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl QuoteFailure {
    /// A failure with the generic retry suggestion.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: None,
            suggestion: Some(DEFAULT_SUGGESTION.to_string()),
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for QuoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.details {
            Some(ref details) => write!(f, "{} ({details})", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// Outcome of one fetch. An empty `Success` means no vehicles were offered,
/// which is a valid answer rather than a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteResult {
    Success { quotes: Vec<Quote> },
    Failure(QuoteFailure),
}

impl QuoteResult {
    pub fn is_success(&self) -> bool {
        matches!(self, QuoteResult::Success { .. })
    }
}

impl From<QuoteFailure> for QuoteResult {
    fn from(failure: QuoteFailure) -> Self {
        QuoteResult::Failure(failure)
    }
}
