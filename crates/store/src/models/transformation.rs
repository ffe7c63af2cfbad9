//! Transformation entity

use chrono::{DateTime, Utc};

/// A named script applied by transform routes.
#[derive(Debug, Clone)]
pub struct Transformation {
    /// Unique id (UUID)
    pub id: String,
    /// Display name (unique)
    pub name: String,
    /// "javascript" or "starlark"
    pub engine: String,
    /// Script source text
    pub script: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transformation {
    /// Create a new transformation.
    pub fn new(
        name: impl Into<String>,
        engine: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            engine: engine.into(),
            script: script.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
