//! Entity types stored in the configuration database

mod application;
mod channel;
mod collector;
mod integration;
mod route;
mod transformation;

pub use application::Application;
pub use channel::{Channel, ChannelInfo, DIRECTION_INBOUND, DIRECTION_OUTBOUND};
pub use collector::Collector;
pub use integration::Integration;
pub use route::{
    collector_output_source, Route, RouteInfo, RouteSource, COLLECTOR_SOURCE_PREFIX,
    ROUTE_TYPE_DIRECT, ROUTE_TYPE_TRANSFORM,
};
pub use transformation::Transformation;

use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError};

/// Current time as the stored RFC3339 text form.
pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored timestamp.
///
/// Columns added by migration default to an empty string; those map to
/// the epoch rather than failing every subsequent read.
pub(crate) fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    if value.is_empty() {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(column, e.to_string()))
}

/// Empty-string ↔ `None` translation for optional reference columns.
pub(crate) fn opt_from_column(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The stored form of an optional reference.
pub(crate) fn opt_to_column(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_roundtrip() {
        let now = now_string();
        let parsed = parse_timestamp("created_at", &now).unwrap();
        assert_eq!(parsed.to_rfc3339(), now);
    }

    #[test]
    fn test_parse_timestamp_empty_is_epoch() {
        let parsed = parse_timestamp("created_at", "").unwrap();
        assert_eq!(parsed, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_parse_timestamp_garbage_is_corrupt() {
        assert!(parse_timestamp("created_at", "yesterday").is_err());
    }

    #[test]
    fn test_optional_column_translation() {
        assert_eq!(opt_from_column(String::new()), None);
        assert_eq!(opt_from_column("x".into()), Some("x".into()));
        assert_eq!(opt_to_column(&None), "");
        assert_eq!(opt_to_column(&Some("x".into())), "x");
    }
}
