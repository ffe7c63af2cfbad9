//! Application entity

use chrono::{DateTime, Utc};

/// A credential-bearing producer/consumer identity.
///
/// Applications own channels; deleting an application removes its
/// channels (and the routes hanging off them) in the same transaction.
#[derive(Debug, Clone)]
pub struct Application {
    /// Unique id (UUID)
    pub id: String,
    /// Display name (unique)
    pub name: String,
    /// Secret presented when requesting a token
    pub client_secret: String,
    /// Opaque token identifying the application on the bus
    pub id_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Create a new application with generated credentials.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            client_secret: uuid::Uuid::new_v4().to_string(),
            id_token: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
