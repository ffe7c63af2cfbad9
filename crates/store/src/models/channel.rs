//! Channel entity

use chrono::{DateTime, Utc};

/// Messages flow from the bus into the consuming application.
pub const DIRECTION_INBOUND: &str = "inbound";

/// Messages flow out of the producing application into the bus.
pub const DIRECTION_OUTBOUND: &str = "outbound";

/// A logical endpoint owned by one application.
///
/// `destination` is the base string every broker object name for this
/// channel is derived from. `(application_id, name)` is unique.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Unique id (UUID)
    pub id: String,
    /// Owning application
    pub application_id: String,
    /// Display name, unique per application
    pub name: String,
    /// "inbound" or "outbound"
    pub direction: String,
    /// Broker base name for derived topology names
    pub destination: String,
    /// Per-route subscription queues instead of one competing-consumer queue
    pub fanout_mode: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Create a new channel.
    pub fn new(
        application_id: impl Into<String>,
        name: impl Into<String>,
        direction: impl Into<String>,
        destination: impl Into<String>,
        fanout_mode: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            application_id: application_id.into(),
            name: name.into(),
            direction: direction.into(),
            destination: destination.into(),
            fanout_mode,
            created_at: Utc::now(),
        }
    }
}

/// A channel joined with its application name, for picklists.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub destination: String,
    pub fanout_mode: bool,
    pub application_name: String,
}
