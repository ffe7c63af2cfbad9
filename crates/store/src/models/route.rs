//! Route entity and derived views

use chrono::{DateTime, Utc};

/// Route that republishes the source body unchanged.
pub const ROUTE_TYPE_DIRECT: &str = "direct";

/// Route that pipes the body through a transformation script.
pub const ROUTE_TYPE_TRANSFORM: &str = "transform";

/// Prefix marking a route source that is a collector's output exchange
/// rather than a channel id.
pub const COLLECTOR_SOURCE_PREFIX: &str = "collector-output:";

/// The route-source id (and exchange name) for a collector.
pub fn collector_output_source(collector_id: &str) -> String {
    format!("{COLLECTOR_SOURCE_PREFIX}{collector_id}")
}

/// A directed mediation rule between two channels.
///
/// The source is either a channel id or `collector-output:<id>`. A
/// transform route must carry a transformation id; dispatch dead-letters
/// otherwise. The destination may dangle after deletions — dispatch
/// treats that as fatal per message, not per route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Unique id (UUID)
    pub id: String,
    pub name: String,
    /// Channel id or `collector-output:<collector_id>`
    pub source_channel_id: String,
    pub destination_channel_id: Option<String>,
    /// "direct" or "transform"
    pub route_type: String,
    /// Required when `route_type` is "transform"
    pub transformation_id: Option<String>,
    /// Grouping label, no runtime effect
    pub integration_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Create a new route.
    pub fn new(
        name: impl Into<String>,
        source_channel_id: impl Into<String>,
        destination_channel_id: Option<String>,
        route_type: impl Into<String>,
        transformation_id: Option<String>,
        integration_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source_channel_id: source_channel_id.into(),
            destination_channel_id,
            route_type: route_type.into(),
            transformation_id,
            integration_id,
            created_at: Utc::now(),
        }
    }

    /// The collector id when the source is a collector output.
    pub fn collector_source(&self) -> Option<&str> {
        self.source_channel_id.strip_prefix(COLLECTOR_SOURCE_PREFIX)
    }
}

/// A route enriched with display names for every reference.
///
/// Built by dereferencing up to four foreign keys; dangling references
/// leave their fields empty instead of failing, so the admin surface
/// stays usable after partial deletions.
#[derive(Debug, Clone, Default)]
pub struct RouteInfo {
    pub id: String,
    pub name: String,
    pub source_channel_id: String,
    pub destination_channel_id: String,
    pub route_type: String,
    pub transformation_id: String,
    pub integration_id: String,
    pub created_at: Option<DateTime<Utc>>,

    /// The broker name the route consumes from (queue base or exchange)
    pub source_base_name: String,
    pub source_channel_name: String,
    pub source_app_name: String,
    pub source_destination: String,
    pub destination_channel_name: String,
    pub destination_app_name: String,
    pub destination_destination: String,
    pub transformation_name: String,
    pub integration_name: String,
}

/// One entry of the unified route-source picklist.
#[derive(Debug, Clone)]
pub struct RouteSource {
    /// Channel id, or `collector-output:<collector_id>`
    pub id: String,
    /// Display label
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_source_detection() {
        let route = Route::new(
            "r1",
            collector_output_source("abc"),
            None,
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        assert_eq!(route.collector_source(), Some("abc"));

        let route = Route::new("r2", "channel-id", None, ROUTE_TYPE_DIRECT, None, None);
        assert_eq!(route.collector_source(), None);
    }
}
