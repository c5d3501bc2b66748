//! What became of one delivered message.

/// The outcome of processing a message, and with it the acknowledgement
/// decision. Everything except [`Disposition::Retry`] removes the message
/// from the live queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Quotes fetched and every one accepted downstream.
    Completed { relayed: usize },
    /// Fetch succeeded but offered no vehicles. Nothing to relay.
    NoQuotes,
    /// The message can never succeed: undecodable, missing required
    /// fields, or failing validation.
    Dropped { reason: String },
    /// Delivered more times than the attempt limit allows.
    DeadLettered { attempts: u32 },
    /// Transient failure. The message redelivers after its visibility timeout.
    Retry { reason: String },
}

impl Disposition {
    /// Whether the message should leave the live queue.
    pub fn acknowledges(&self) -> bool {
        !matches!(self, Disposition::Retry { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Completed { .. } => "completed",
            Disposition::NoQuotes => "no_quotes",
            Disposition::Dropped { .. } => "dropped",
            Disposition::DeadLettered { .. } => "dead_lettered",
            Disposition::Retry { .. } => "retry",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Completed { relayed } => write!(f, "completed ({relayed} quotes relayed)"),
            Disposition::NoQuotes => write!(f, "no quotes offered"),
            Disposition::Dropped { reason } => write!(f, "dropped: {reason}"),
            Disposition::DeadLettered { attempts } => {
                write!(f, "dead-lettered after {attempts} deliveries")
            }
            Disposition::Retry { reason } => write!(f, "retry: {reason}"),
        }
    }
}
