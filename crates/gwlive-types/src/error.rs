//! Error types for data parsing in gwlive-types.

use thiserror::Error;

/// Errors that can occur when parsing telemetry model values.
///
/// This error type is transport-agnostic. Wire decoding never produces it:
/// malformed tuples are skipped by the decoder in gwlive-core instead.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// Input could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Sensor type string was neither `analog` nor `digital`.
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),
}

/// Result type alias using gwlive-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
