//! Error types for porter-quotes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("undecodable message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(#[from] sqlx::Error),

    #[error("relay rejected quote with status {status}: {body}")]
    Relay { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that retrying cannot fix. The consumer loop stops on these
    /// instead of backing off.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Queue(sqlx::Error::Configuration(_)) => true,
            Error::Queue(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| is_fatal_sqlstate(&code))
            }
            _ => false,
        }
    }
}

/// Postgres error codes that no amount of waiting will clear.
fn is_fatal_sqlstate(code: &str) -> bool {
    // Class 28: invalid authorization (28000, 28P01 bad password)
    code.starts_with("28")
        // 42P01 undefined_table: the pgmq queue does not exist
        || code == "42P01"
        // 42883 undefined_function: pgmq functions are missing
        || code == "42883"
        // 3F000 invalid_schema_name: pgmq extension is not installed
        || code == "3F000"
}

pub type Result<T> = std::result::Result<T, Error>;
