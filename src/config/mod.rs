//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values.
//! The queue connection string carries credentials, so it is wrapped in
//! `secrecy::SecretString` to keep it out of logs.

use crate::error::{Error, Result};
use crate::relay::RelayMode;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUEUE: &str = "quote_requests";
pub const DEFAULT_RELAY_BASE_URL: &str = "http://localhost:8080/porter";

#[derive(Debug)]
pub struct Config {
    /// Postgres URL of the database hosting the pgmq queue.
    pub database_url: Option<SecretString>,
    pub queue_name: String,
    pub relay_base_url: String,
    pub relay_mode: RelayMode,
    /// Deliveries after which a message is dead-lettered. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub visibility_timeout: Duration,
    pub chrome_path: Option<PathBuf>,
    pub http_addr: SocketAddr,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_attempts = match var("MAX_ATTEMPTS") {
            Some(raw) => {
                let n: u32 = parse_var("MAX_ATTEMPTS", &raw)?;
                if n == 0 {
                    return Err(Error::Config("MAX_ATTEMPTS must be at least 1".to_string()));
                }
                Some(n)
            }
            None => None,
        };

        let visibility_secs: u64 = match var("VISIBILITY_TIMEOUT_SECS") {
            Some(raw) => parse_var("VISIBILITY_TIMEOUT_SECS", &raw)?,
            None => 60,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").map(SecretString::from),
            queue_name: var("QUOTE_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            relay_base_url: var("RELAY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RELAY_BASE_URL.to_string()),
            relay_mode: match var("RELAY_MODE") {
                Some(raw) => parse_var("RELAY_MODE", &raw)?,
                None => RelayMode::default(),
            },
            max_attempts,
            visibility_timeout: Duration::from_secs(visibility_secs),
            chrome_path: var("CHROME_PATH").map(PathBuf::from),
            http_addr: match var("HTTP_ADDR") {
                Some(raw) => parse_var("HTTP_ADDR", &raw)?,
                None => SocketAddr::from(([0, 0, 0, 0], 8000)),
            },
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The queue database URL, required by every command that touches the queue.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value for {name}: {e}")))
}
