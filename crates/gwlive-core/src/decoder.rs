//! Wire decoder for relayed gateway messages.
//!
//! A relayed message is a JSON array whose first element is the tenant id and
//! whose remaining elements are 4-tuples:
//!
//! ```text
//! ["tenantA", [23.5, 0, 50, "s1"], [true, 10, 1, "s2"]]
//!              ^     ^  ^   ^
//!              |     |  |   sensor id (string)
//!              |     |  sensor kind (int)
//!              |     status code (non-negative int)
//!              value (number or bool)
//! ```
//!
//! Decoding never fails. A payload that is not a JSON array is dropped as a
//! whole; a tuple that cannot be read is skipped on its own and the rest of
//! the message is still decoded. The decoder is a pure function of its
//! input.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use gwlive_types::{ReadingValue, SensorKind, SensorReading, StatusCode};

/// Minimum number of elements in a tuple reading.
pub const TUPLE_LEN: usize = 4;

/// A message as handed over by the connection layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Timestamp applied to every reading in the message.
    pub server_timestamp: OffsetDateTime,
}

impl RawMessage {
    /// Create a raw message.
    pub fn new(payload: impl Into<Bytes>, server_timestamp: OffsetDateTime) -> Self {
        Self {
            payload: payload.into(),
            server_timestamp,
        }
    }
}

/// Why a message or tuple was not turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Payload was not valid JSON.
    InvalidJson,
    /// Payload was JSON but not an array.
    NotAnArray,
    /// Tuple element was not an array.
    NotATuple,
    /// Tuple had fewer than four elements.
    TooShort {
        /// Number of elements present.
        len: usize,
    },
    /// Value was neither a number nor a boolean.
    InvalidValue,
    /// Status code was not a non-negative integer.
    InvalidStatusCode,
    /// Sensor kind was not a non-negative integer.
    InvalidSensorKind,
    /// Sensor id was not a non-empty string.
    InvalidSensorId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidJson => write!(f, "payload is not valid JSON"),
            SkipReason::NotAnArray => write!(f, "payload is not a JSON array"),
            SkipReason::NotATuple => write!(f, "tuple is not an array"),
            SkipReason::TooShort { len } => {
                write!(f, "tuple has {} elements, need {}", len, TUPLE_LEN)
            }
            SkipReason::InvalidValue => write!(f, "value is not a number or boolean"),
            SkipReason::InvalidStatusCode => write!(f, "status code is not a non-negative integer"),
            SkipReason::InvalidSensorKind => write!(f, "sensor kind is not a non-negative integer"),
            SkipReason::InvalidSensorId => write!(f, "sensor id is not a non-empty string"),
        }
    }
}

/// Outcome for a single tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleOutcome {
    /// Tuple decoded into a reading.
    Reading(SensorReading),
    /// Tuple was skipped.
    Skipped(SkipReason),
}

/// Outcome for a whole message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Payload was an array; one outcome per tuple, in message order.
    Message {
        /// Tenant id from element 0, when it is a string.
        tenant_id: Option<String>,
        /// Per-tuple outcomes.
        outcomes: Vec<TupleOutcome>,
    },
    /// Payload was dropped as a whole.
    Dropped(SkipReason),
}

impl Decoded {
    /// Successfully decoded readings, in message order.
    pub fn readings(&self) -> Vec<SensorReading> {
        match self {
            Decoded::Message { outcomes, .. } => outcomes
                .iter()
                .filter_map(|o| match o {
                    TupleOutcome::Reading(r) => Some(r.clone()),
                    TupleOutcome::Skipped(_) => None,
                })
                .collect(),
            Decoded::Dropped(_) => Vec::new(),
        }
    }

    /// Consume into the decoded readings.
    pub fn into_readings(self) -> Vec<SensorReading> {
        match self {
            Decoded::Message { outcomes, .. } => outcomes
                .into_iter()
                .filter_map(|o| match o {
                    TupleOutcome::Reading(r) => Some(r),
                    TupleOutcome::Skipped(_) => None,
                })
                .collect(),
            Decoded::Dropped(_) => Vec::new(),
        }
    }

    /// Number of skipped tuples (0 for a dropped message).
    pub fn skipped_count(&self) -> usize {
        match self {
            Decoded::Message { outcomes, .. } => outcomes
                .iter()
                .filter(|o| matches!(o, TupleOutcome::Skipped(_)))
                .count(),
            Decoded::Dropped(_) => 0,
        }
    }

    /// Whether the whole message was dropped.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Decoded::Dropped(_))
    }
}

/// Decode a raw relayed message.
pub fn decode(message: &RawMessage) -> Decoded {
    decode_payload(&message.payload, message.server_timestamp)
}

/// Decode payload bytes, stamping every reading with `server_timestamp`.
pub fn decode_payload(payload: &[u8], server_timestamp: OffsetDateTime) -> Decoded {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(_) => return Decoded::Dropped(SkipReason::InvalidJson),
    };
    decode_value(&value, server_timestamp)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(value: &Value, server_timestamp: OffsetDateTime) -> Decoded {
    let Value::Array(elements) = value else {
        return Decoded::Dropped(SkipReason::NotAnArray);
    };

    let mut iter = elements.iter();
    let tenant_id = iter
        .next()
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let outcomes = iter
        .map(|tuple| match decode_tuple(tuple, server_timestamp) {
            Ok(reading) => TupleOutcome::Reading(reading),
            Err(reason) => TupleOutcome::Skipped(reason),
        })
        .collect();

    Decoded::Message {
        tenant_id,
        outcomes,
    }
}

fn decode_tuple(
    tuple: &Value,
    server_timestamp: OffsetDateTime,
) -> Result<SensorReading, SkipReason> {
    let Value::Array(fields) = tuple else {
        return Err(SkipReason::NotATuple);
    };
    if fields.len() < TUPLE_LEN {
        return Err(SkipReason::TooShort { len: fields.len() });
    }

    let value = match &fields[0] {
        Value::Bool(b) => ReadingValue::Bool(*b),
        Value::Number(n) => n
            .as_f64()
            .map(ReadingValue::Number)
            .ok_or(SkipReason::InvalidValue)?,
        _ => return Err(SkipReason::InvalidValue),
    };
    let status_code = non_negative(&fields[1]).ok_or(SkipReason::InvalidStatusCode)?;
    let sensor_kind = non_negative(&fields[2]).ok_or(SkipReason::InvalidSensorKind)?;
    let sensor_id = fields[3]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::InvalidSensorId)?;

    Ok(SensorReading {
        sensor_id: sensor_id.to_string(),
        value,
        status_code: StatusCode(status_code),
        sensor_kind: SensorKind(sensor_kind),
        server_timestamp,
    })
}

/// Non-negative integer that fits in `u32`. Integral floats such as `10.0`
/// are accepted since some gateways serialise every number as a double.
fn non_negative(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn decode_str(s: &str) -> Decoded {
        decode_payload(s.as_bytes(), ts())
    }

    #[test]
    fn test_decode_reference_message() {
        let decoded = decode_str(r#"["tenantA", [23.5, 0, 50, "s1"], [true, 10, 1, "s2"]]"#);

        let Decoded::Message {
            tenant_id,
            outcomes,
        } = &decoded
        else {
            panic!("expected message, got {:?}", decoded);
        };
        assert_eq!(tenant_id.as_deref(), Some("tenantA"));
        assert_eq!(outcomes.len(), 2);

        let readings = decoded.readings();
        assert_eq!(readings[0].sensor_id, "s1");
        assert_eq!(readings[0].value, ReadingValue::Number(23.5));
        assert_eq!(readings[0].status_code, StatusCode::NORMAL);
        assert_eq!(readings[0].sensor_kind, SensorKind(50));
        assert_eq!(readings[0].server_timestamp, ts());

        assert_eq!(readings[1].sensor_id, "s2");
        assert_eq!(readings[1].value, ReadingValue::Bool(true));
        assert_eq!(readings[1].status_code, StatusCode::WARNING);
    }

    #[test]
    fn test_boolean_is_preserved() {
        let readings = decode_str(r#"["t", [false, 0, 1, "d1"]]"#).into_readings();
        assert_eq!(readings[0].value, ReadingValue::Bool(false));
    }

    #[test]
    fn test_non_array_payload_is_dropped() {
        assert_eq!(
            decode_str(r#"{"tenant":"a"}"#),
            Decoded::Dropped(SkipReason::NotAnArray)
        );
        assert_eq!(decode_str("42"), Decoded::Dropped(SkipReason::NotAnArray));
        assert_eq!(
            decode_str("not json"),
            Decoded::Dropped(SkipReason::InvalidJson)
        );
    }

    #[test]
    fn test_short_tuple_skipped_rest_decoded() {
        let decoded = decode_str(r#"["t", [1.0, 0, 50], [2.0, 0, 50, "ok"]]"#);
        assert_eq!(decoded.skipped_count(), 1);
        let readings = decoded.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, "ok");

        let Decoded::Message { outcomes, .. } = decoded else {
            panic!("expected message");
        };
        assert_eq!(
            outcomes[0],
            TupleOutcome::Skipped(SkipReason::TooShort { len: 3 })
        );
    }

    #[test]
    fn test_malformed_fields_skipped() {
        let decoded = decode_str(
            r#"["t",
                "nope",
                ["x", 0, 50, "a"],
                [1, -1, 50, "b"],
                [1, 0, 1.5, "c"],
                [1, 0, 50, 7],
                [1, 0, 50, ""],
                [1, 0, 50, "good"]]"#,
        );
        let Decoded::Message { outcomes, .. } = &decoded else {
            panic!("expected message");
        };
        let reasons: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                TupleOutcome::Skipped(r) => Some(r.clone()),
                TupleOutcome::Reading(_) => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::NotATuple,
                SkipReason::InvalidValue,
                SkipReason::InvalidStatusCode,
                SkipReason::InvalidSensorKind,
                SkipReason::InvalidSensorId,
                SkipReason::InvalidSensorId,
            ]
        );
        assert_eq!(decoded.readings().len(), 1);
    }

    #[test]
    fn test_unknown_status_code_passes_through() {
        let readings = decode_str(r#"["t", [5, 37, 50, "s"]]"#).into_readings();
        assert_eq!(readings[0].status_code, StatusCode(37));
    }

    #[test]
    fn test_integral_float_codes_accepted() {
        let readings = decode_str(r#"["t", [5, 20.0, 50.0, "s"]]"#).into_readings();
        assert_eq!(readings[0].status_code, StatusCode::CRITICAL);
        assert_eq!(readings[0].sensor_kind, SensorKind(50));
    }

    #[test]
    fn test_extra_tuple_elements_ignored() {
        let readings = decode_str(r#"["t", [5, 0, 50, "s", "extra", 1]]"#).into_readings();
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_tenant_only_and_empty_messages() {
        let decoded = decode_str(r#"["t"]"#);
        assert!(!decoded.is_dropped());
        assert!(decoded.readings().is_empty());

        let decoded = decode_str("[]");
        assert!(!decoded.is_dropped());
        assert!(decoded.readings().is_empty());
    }

    #[test]
    fn test_decode_is_idempotent() {
        let msg = RawMessage::new(
            r#"["tenantA", [23.5, 0, 50, "s1"], [1, 0], [true, 10, 1, "s2"]]"#,
            ts(),
        );
        assert_eq!(decode(&msg), decode(&msg));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::TooShort { len: 2 }.to_string(),
            "tuple has 2 elements, need 4"
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn json_leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i32>().prop_map(|n| Value::from(n)),
                (-1.0e6f64..1.0e6).prop_map(|f| Value::from(f)),
                "[a-z0-9]{0,6}".prop_map(Value::from),
            ]
        }

        fn json_tree() -> impl Strategy<Value = Value> {
            json_leaf().prop_recursive(3, 32, 6, |inner| {
                prop::collection::vec(inner, 0..6).prop_map(Value::Array)
            })
        }

        proptest! {
            #[test]
            fn decoding_is_pure(value in json_tree()) {
                let bytes = serde_json::to_vec(&value).unwrap();
                let first = decode_payload(&bytes, ts());
                let second = decode_payload(&bytes, ts());
                prop_assert_eq!(first, second);
            }

            #[test]
            fn readings_never_exceed_tuples(value in json_tree()) {
                let decoded = decode_value(&value, ts());
                if let Value::Array(items) = &value {
                    let tuples = items.len().saturating_sub(1);
                    prop_assert!(decoded.readings().len() + decoded.skipped_count() == tuples);
                } else {
                    prop_assert!(decoded.is_dropped());
                }
            }
        }
    }
}
