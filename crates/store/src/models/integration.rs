//! Integration entity

use chrono::{DateTime, Utc};

/// A grouping label for routes and collectors. Descriptive only.
#[derive(Debug, Clone)]
pub struct Integration {
    /// Unique id (UUID)
    pub id: String,
    /// Display name (unique)
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    /// Create a new integration.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
