//! Platform-agnostic types for relayed industrial sensor telemetry.
//!
//! This crate provides the shared data model used by the decoding,
//! aggregation and chart-adaptation code in gwlive-core, and by any
//! consumer that renders the results.
//!
//! # Features
//!
//! - Decoded tuple readings with boolean values preserved
//! - Pass-through status and kind codes
//! - History points with numeric coercion
//! - Catalog metadata (scales, alarm thresholds, units)
//!
//! # Example
//!
//! ```
//! use gwlive_types::{HistoryPoint, SensorKind, SensorReading, StatusCode};
//! use time::OffsetDateTime;
//!
//! let reading = SensorReading::new(
//!     "s2",
//!     true,
//!     StatusCode::WARNING,
//!     SensorKind(1),
//!     OffsetDateTime::UNIX_EPOCH,
//! );
//! let point = HistoryPoint::from(&reading);
//! assert_eq!(point.numeric_value, 1.0);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    HistoryPoint, ReadingValue, SensorKind, SensorMetadata, SensorReading, SensorType, StatusCode,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn reading(value: ReadingValue, status: u32) -> SensorReading {
        SensorReading::new(
            "s1",
            value,
            StatusCode(status),
            SensorKind(50),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    // --- StatusCode tests ---

    #[test]
    fn test_status_code_constants() {
        assert_eq!(StatusCode::NORMAL.value(), 0);
        assert_eq!(StatusCode::WARNING.value(), 10);
        assert_eq!(StatusCode::CRITICAL.value(), 20);
    }

    #[test]
    fn test_status_code_recognized() {
        assert!(StatusCode::NORMAL.is_recognized());
        assert!(StatusCode::WARNING.is_recognized());
        assert!(StatusCode::CRITICAL.is_recognized());
        assert!(!StatusCode(5).is_recognized());
        assert!(!StatusCode(30).is_recognized());
    }

    #[test]
    fn test_status_code_unknown_passes_through() {
        let code = StatusCode::from(99);
        assert_eq!(code.value(), 99);
        assert!(!code.is_alert());
    }

    #[test]
    fn test_status_code_alert() {
        assert!(!StatusCode::NORMAL.is_alert());
        assert!(StatusCode::WARNING.is_alert());
        assert!(StatusCode::CRITICAL.is_alert());
    }

    // --- ReadingValue tests ---

    #[test]
    fn test_reading_value_bool_coercion() {
        assert_eq!(ReadingValue::Bool(true).as_f64(), 1.0);
        assert_eq!(ReadingValue::Bool(false).as_f64(), 0.0);
    }

    #[test]
    fn test_reading_value_is_on() {
        assert!(ReadingValue::Bool(true).is_on());
        assert!(!ReadingValue::Bool(false).is_on());
        assert!(ReadingValue::Number(0.5).is_on());
        assert!(ReadingValue::Number(-3.0).is_on());
        assert!(!ReadingValue::Number(0.0).is_on());
    }

    #[test]
    fn test_reading_value_display() {
        assert_eq!(ReadingValue::Number(23.5).to_string(), "23.5");
        assert_eq!(ReadingValue::Bool(true).to_string(), "true");
    }

    // --- HistoryPoint tests ---

    #[test]
    fn test_history_point_from_bool_reading() {
        let point = HistoryPoint::from(&reading(ReadingValue::Bool(true), 10));
        assert_eq!(point.numeric_value, 1.0);
        assert_eq!(point.status_code, StatusCode::WARNING);

        let point = HistoryPoint::from(&reading(ReadingValue::Bool(false), 0));
        assert_eq!(point.numeric_value, 0.0);
    }

    #[test]
    fn test_history_point_keeps_timestamp() {
        let r = reading(ReadingValue::Number(1.0), 0);
        let point = HistoryPoint::from(&r);
        assert_eq!(point.timestamp, r.server_timestamp);
    }

    // --- SensorType tests ---

    #[test]
    fn test_sensor_type_parse() {
        assert_eq!("analog".parse::<SensorType>(), Ok(SensorType::Analog));
        assert_eq!(" DIGITAL ".parse::<SensorType>(), Ok(SensorType::Digital));
        assert_eq!(
            "valve".parse::<SensorType>(),
            Err(ParseError::UnknownSensorType("valve".to_string()))
        );
    }

    #[test]
    fn test_sensor_type_display() {
        assert_eq!(SensorType::Analog.to_string(), "analog");
        assert_eq!(SensorType::Digital.to_string(), "digital");
    }

    // --- SensorMetadata tests ---

    #[test]
    fn test_metadata_alarm_range_requires_both_bounds() {
        let meta = SensorMetadata::new("p1", "Pressure", SensorType::Analog, 0.0, 10.0);
        assert!(meta.alarm_range().is_none());

        let mut half = meta.clone();
        half.min_alarm = Some(1.0);
        assert!(half.alarm_range().is_none());

        let full = meta.with_alarms(1.0, 9.0);
        assert_eq!(full.alarm_range(), Some((1.0, 9.0)));
    }

    #[test]
    fn test_metadata_unit_symbol() {
        let meta = SensorMetadata::new("t1", "Oven", SensorType::Analog, 0.0, 300.0);
        assert_eq!(meta.unit_symbol(), "");
        assert_eq!(meta.with_unit("°C").unit_symbol(), "°C");
    }

    // --- ParseError tests ---

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidData("test message".to_string());
        assert_eq!(err.to_string(), "Invalid data: test message");
        let err = ParseError::UnknownSensorType("valve".to_string());
        assert_eq!(err.to_string(), "Unknown sensor type: valve");
    }

    // --- Serialization tests ---

    #[test]
    fn test_reading_value_serialization_untagged() {
        assert_eq!(
            serde_json::to_string(&ReadingValue::Number(23.5)).unwrap(),
            "23.5"
        );
        assert_eq!(
            serde_json::to_string(&ReadingValue::Bool(true)).unwrap(),
            "true"
        );
        let v: ReadingValue = serde_json::from_str("false").unwrap();
        assert_eq!(v, ReadingValue::Bool(false));
    }

    #[test]
    fn test_sensor_reading_serialization() {
        let json = serde_json::to_string(&reading(ReadingValue::Number(23.5), 0)).unwrap();
        assert!(json.contains("\"sensor_id\":\"s1\""));
        assert!(json.contains("\"status_code\":0"));
        assert!(json.contains("\"sensor_kind\":50"));
        assert!(json.contains("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_metadata_deserialization_defaults() {
        let json = r#"{"sensor_id":"p1","name":"Pump","min_scale":0,"max_scale":100}"#;
        let meta: SensorMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.kind, SensorType::Analog);
        assert!(meta.min_alarm.is_none());
        assert!(meta.unit.is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn numeric_values_survive_history_coercion(v in -1.0e9f64..1.0e9) {
                let point = HistoryPoint::from(&reading(ReadingValue::Number(v), 0));
                prop_assert_eq!(point.numeric_value, v);
            }

            #[test]
            fn status_codes_pass_through(code in 0u32..10_000) {
                let r = reading(ReadingValue::Number(1.0), code);
                prop_assert_eq!(HistoryPoint::from(&r).status_code.value(), code);
            }
        }
    }
}
