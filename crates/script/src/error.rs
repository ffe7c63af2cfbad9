//! Script host error types

use thiserror::Error;

/// Script execution errors
///
/// Route workers treat every variant the same way — drop the message
/// without requeueing — but the variants keep logs diagnosable.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The transformation names an engine the host doesn't provide
    #[error("unsupported scripting engine: {0}")]
    UnknownEngine(String),

    /// The script failed to parse or its top level failed to run
    #[error("script failed to compile: {0}")]
    Compile(String),

    /// The entry function raised
    #[error("script failed at runtime: {0}")]
    Runtime(String),

    /// The script defines neither `transform` nor `collect`
    #[error("script must define a 'transform' or 'collect' function")]
    NoEntryFunction,

    /// The entry function returned something other than a mapping or None
    #[error("bad script result: {0}")]
    BadResult(String),

    /// An integer crossed the host's 64-bit signed range
    #[error("integer out of range for the host value model")]
    IntOutOfRange,
}

/// Result type for script operations
pub type Result<T> = std::result::Result<T, ScriptError>;
