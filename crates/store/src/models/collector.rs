//! Collector entity

use chrono::{DateTime, Utc};

/// A scheduled script job that injects messages into the bus.
///
/// Each collector owns one output exchange named
/// `collector-output:<id>`; routes subscribe to it.
#[derive(Debug, Clone)]
pub struct Collector {
    /// Unique id (UUID)
    pub id: String,
    /// Display name (unique)
    pub name: String,
    /// Cron expression, or `@every <n><unit>`
    pub schedule: String,
    /// "javascript" or "starlark"
    pub engine: String,
    /// Script source text; must define `collect()`
    pub script: String,
    /// Grouping label, no runtime effect
    pub integration_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        engine: impl Into<String>,
        script: impl Into<String>,
        integration_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            schedule: schedule.into(),
            engine: engine.into(),
            script: script.into(),
            integration_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// The collector's output exchange name.
    pub fn output_exchange(&self) -> String {
        super::collector_output_source(&self.id)
    }
}
