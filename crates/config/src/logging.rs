//! Log level configuration

use serde::Deserialize;

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Normal operation (default)
    #[default]
    Info,
    /// Debugging information
    Debug,
}

impl LogLevel {
    /// Convert to a tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_all_levels() {
        for (s, expected) in [
            ("\"error\"", LogLevel::Error),
            ("\"warn\"", LogLevel::Warn),
            ("\"info\"", LogLevel::Info),
            ("\"debug\"", LogLevel::Debug),
        ] {
            let level: LogLevel = serde_json::from_str(s).unwrap();
            assert_eq!(level, expected);
        }
    }

    #[test]
    fn test_level_as_str() {
        assert_eq!(LogLevel::Error.as_str(), "error");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(serde_json::from_str::<LogLevel>("\"verbose\"").is_err());
    }
}
