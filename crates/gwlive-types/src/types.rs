//! Core types for relayed sensor telemetry.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Status code attached to every tuple reading by the upstream gateway.
///
/// Only `0`, `10` and `20` carry a meaning today. Any other non-negative
/// code is kept verbatim so that newer gateways are never silently
/// downgraded to "normal" on the way through.
///
/// ```
/// use gwlive_types::StatusCode;
///
/// assert!(StatusCode::WARNING.is_alert());
/// assert!(!StatusCode(42).is_recognized());
/// assert_eq!(StatusCode::from(20), StatusCode::CRITICAL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Normal operation.
    pub const NORMAL: StatusCode = StatusCode(0);
    /// Warning raised upstream.
    pub const WARNING: StatusCode = StatusCode(10);
    /// Critical alarm raised upstream.
    pub const CRITICAL: StatusCode = StatusCode(20);

    /// Raw numeric code.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Whether the code is one of the three documented values.
    #[must_use]
    pub fn is_recognized(self) -> bool {
        matches!(self, Self::NORMAL | Self::WARNING | Self::CRITICAL)
    }

    /// Whether the code represents a warning or critical alert.
    #[must_use]
    pub fn is_alert(self) -> bool {
        matches!(self, Self::WARNING | Self::CRITICAL)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        StatusCode(value)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream sensor kind code (digital, analog, temperature, ...).
///
/// The gateway's numbering is opaque to this crate; the value is carried
/// through for consumers that know the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SensorKind(pub u32);

impl From<u32> for SensorKind {
    fn from(value: u32) -> Self {
        SensorKind(value)
    }
}

/// A reading value as delivered on the wire.
///
/// Booleans are preserved here; they are only coerced to `0.0` / `1.0` when a
/// [`HistoryPoint`] is built.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum ReadingValue {
    /// Continuous measurement.
    Number(f64),
    /// On/off style measurement.
    Bool(bool),
}

impl ReadingValue {
    /// Numeric view of the value. `true` is `1.0`, `false` is `0.0`.
    ///
    /// ```
    /// use gwlive_types::ReadingValue;
    ///
    /// assert_eq!(ReadingValue::Bool(true).as_f64(), 1.0);
    /// assert_eq!(ReadingValue::Number(23.5).as_f64(), 23.5);
    /// ```
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            ReadingValue::Number(n) => n,
            ReadingValue::Bool(true) => 1.0,
            ReadingValue::Bool(false) => 0.0,
        }
    }

    /// On/off interpretation: any non-zero number or `true` is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        match *self {
            ReadingValue::Number(n) => n != 0.0,
            ReadingValue::Bool(b) => b,
        }
    }

    /// Whether the value arrived as a boolean.
    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self, ReadingValue::Bool(_))
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::Number(value)
    }
}

impl From<bool> for ReadingValue {
    fn from(value: bool) -> Self {
        ReadingValue::Bool(value)
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(n) => write!(f, "{}", n),
            ReadingValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One decoded tuple reading.
///
/// Readings are immutable once built; a newer reading for the same sensor
/// supersedes the old one rather than modifying it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    /// Sensor identifier as sent by the gateway.
    pub sensor_id: String,
    /// Measured value.
    pub value: ReadingValue,
    /// Upstream status code.
    pub status_code: StatusCode,
    /// Upstream sensor kind code.
    pub sensor_kind: SensorKind,
    /// Timestamp supplied with the relayed message.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub server_timestamp: OffsetDateTime,
}

impl SensorReading {
    /// Create a new reading.
    pub fn new(
        sensor_id: impl Into<String>,
        value: impl Into<ReadingValue>,
        status_code: StatusCode,
        sensor_kind: SensorKind,
        server_timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value: value.into(),
            status_code,
            sensor_kind,
            server_timestamp,
        }
    }
}

/// A single entry of a sensor's rolling history.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryPoint {
    /// Server timestamp of the reading.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Value coerced to a number.
    pub numeric_value: f64,
    /// Upstream status code.
    pub status_code: StatusCode,
}

impl From<&SensorReading> for HistoryPoint {
    fn from(reading: &SensorReading) -> Self {
        Self {
            timestamp: reading.server_timestamp,
            numeric_value: reading.value.as_f64(),
            status_code: reading.status_code,
        }
    }
}

/// Catalog classification of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
#[non_exhaustive]
pub enum SensorType {
    /// Continuous measurement.
    #[default]
    Analog,
    /// Boolean-like measurement.
    Digital,
}

impl FromStr for SensorType {
    type Err = ParseError;

    /// Parse a sensor type, case-insensitively.
    ///
    /// ```
    /// use gwlive_types::SensorType;
    ///
    /// assert_eq!("Digital".parse::<SensorType>(), Ok(SensorType::Digital));
    /// assert!("pneumatic".parse::<SensorType>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analog" => Ok(SensorType::Analog),
            "digital" => Ok(SensorType::Digital),
            _ => Err(ParseError::UnknownSensorType(s.to_string())),
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Analog => write!(f, "analog"),
            SensorType::Digital => write!(f, "digital"),
        }
    }
}

/// Sensor description supplied by the catalog service.
///
/// Read-only from the pipeline's point of view.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorMetadata {
    /// Sensor identifier, matching [`SensorReading::sensor_id`].
    pub sensor_id: String,
    /// Display name.
    pub name: String,
    /// Analog or digital.
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: SensorType,
    /// Lower bound of the display scale.
    pub min_scale: f64,
    /// Upper bound of the display scale.
    pub max_scale: f64,
    /// Lower alarm threshold.
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_alarm: Option<f64>,
    /// Upper alarm threshold.
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_alarm: Option<f64>,
    /// Measurement unit symbol, e.g. `bar` or `°C`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: Option<String>,
}

impl SensorMetadata {
    /// Create metadata with a display scale and no alarm thresholds.
    pub fn new(
        sensor_id: impl Into<String>,
        name: impl Into<String>,
        kind: SensorType,
        min_scale: f64,
        max_scale: f64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            name: name.into(),
            kind,
            min_scale,
            max_scale,
            min_alarm: None,
            max_alarm: None,
            unit: None,
        }
    }

    /// Set both alarm thresholds.
    #[must_use]
    pub fn with_alarms(mut self, min_alarm: f64, max_alarm: f64) -> Self {
        self.min_alarm = Some(min_alarm);
        self.max_alarm = Some(max_alarm);
        self
    }

    /// Set the unit symbol.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Alarm range, only when both bounds are defined.
    #[must_use]
    pub fn alarm_range(&self) -> Option<(f64, f64)> {
        match (self.min_alarm, self.max_alarm) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    /// Unit symbol or an empty string.
    #[must_use]
    pub fn unit_symbol(&self) -> &str {
        self.unit.as_deref().unwrap_or("")
    }
}
