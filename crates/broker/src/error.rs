//! Broker error types

use thiserror::Error;

/// Broker gateway errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection or channel level AMQP failure
    #[error("broker transport error: {0}")]
    Transport(#[from] lapin::Error),

    /// A passively declared queue does not exist (yet)
    ///
    /// Expected while the owning application has not declared its
    /// transient queue; workers retry instead of treating this as a
    /// fault.
    #[error("queue '{queue}' does not exist yet")]
    QueueAbsent { queue: String },

    /// Management HTTP API returned a non-success status
    #[error("management API error: {0}")]
    Management(String),

    /// Management HTTP request failed
    #[error("management request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
