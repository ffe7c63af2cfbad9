//! Engine error types

use thiserror::Error;

/// Worker and scheduler errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration store failure
    #[error(transparent)]
    Store(#[from] mezzo_store::StoreError),

    /// Broker gateway failure
    #[error(transparent)]
    Broker(#[from] mezzo_broker::BrokerError),

    /// Script host failure
    #[error(transparent)]
    Script(#[from] mezzo_script::ScriptError),

    /// AMQP consumer failure
    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    /// A consumer stream ended without cancellation
    #[error("consumer for '{queue}' closed")]
    ConsumerClosed { queue: String },

    /// A route's source could not be resolved at worker start
    #[error("route source '{source_id}' not found")]
    SourceMissing { source_id: String },

    /// A collector schedule expression failed to parse
    #[error("invalid schedule '{expression}': {message}")]
    InvalidSchedule { expression: String, message: String },
}

impl EngineError {
    /// Whether this is the expected "transient queue not declared yet"
    /// condition rather than a fault.
    pub(crate) fn is_queue_absent(&self) -> bool {
        matches!(
            self,
            EngineError::Broker(mezzo_broker::BrokerError::QueueAbsent { .. })
        )
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
