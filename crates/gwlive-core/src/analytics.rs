//! Sensor status classification, summary statistics and alerts.
//!
//! # Classification
//!
//! | Condition | Status |
//! |-----------|--------|
//! | No reading for the sensor | [`SensorStatus::Offline`] |
//! | Status code 0 / 10 / 20 | Normal / Warning / Critical |
//! | Other code, value outside `[min_alarm, max_alarm]` | Critical |
//! | Other code, value within 10% of the alarm span from a bound | Warning |
//! | Other code, otherwise | Normal |
//! | Other code, no alarm pair defined | Normal ([`ClassificationMode::Permissive`]) or Warning ([`ClassificationMode::Strict`]) |
//!
//! Threshold comparison only applies when both alarm bounds are present.
//!
//! # Aggregates
//!
//! [`SummaryStats`] counts on the raw status code only and never runs the
//! threshold fallback, so system-wide counts stay consistent with the
//! upstream classification.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use gwlive_types::{SensorMetadata, SensorReading, StatusCode};

use crate::catalog::Catalog;
use crate::store::SensorStateStore;

/// Fraction of the alarm span treated as the warning band near each bound.
pub const WARNING_BAND: f64 = 0.10;

/// Operator-facing status of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    /// No reading received.
    Offline,
    /// Operating normally.
    Normal,
    /// Needs attention.
    Warning,
    /// Out of range.
    Critical,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Offline => write!(f, "offline"),
            SensorStatus::Normal => write!(f, "normal"),
            SensorStatus::Warning => write!(f, "warning"),
            SensorStatus::Critical => write!(f, "critical"),
        }
    }
}

/// How to classify an unrecognised status code when no alarm thresholds exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    /// Treat it as normal.
    #[default]
    Permissive,
    /// Treat it as a warning.
    Strict,
}

impl FromStr for ClassificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(ClassificationMode::Permissive),
            "strict" => Ok(ClassificationMode::Strict),
            other => Err(format!("unknown classification mode: {}", other)),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Status code 10.
    Warning,
    /// Status code 20.
    Critical,
}

impl Severity {
    fn from_code(code: StatusCode) -> Option<Self> {
        match code {
            StatusCode::WARNING => Some(Severity::Warning),
            StatusCode::CRITICAL => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One active alert. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    /// `sensor_id@unix_nanos`, stable for a given reading.
    pub id: String,
    /// Sensor raising the alert.
    pub sensor_id: String,
    /// Severity from the raw status code.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Server timestamp of the triggering reading.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Tenant-wide counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Sensors with at least one reading.
    pub total_sensors: usize,
    /// Tracked sensors at status code 20.
    pub critical_alerts: usize,
    /// Tracked sensors at status code 10.
    pub warning_alerts: usize,
    /// Tracked sensors at status code 0.
    pub normal_sensors: usize,
    /// Catalogued sensors that have not reported.
    pub offline_sensors: usize,
}

/// Derives statuses and alerts from the state store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticsEngine {
    mode: ClassificationMode,
}

impl AnalyticsEngine {
    /// Create an engine with the given fallback mode.
    pub fn new(mode: ClassificationMode) -> Self {
        Self { mode }
    }

    /// Create an engine in strict mode.
    pub fn strict() -> Self {
        Self::new(ClassificationMode::Strict)
    }

    /// Fallback mode in use.
    pub fn mode(&self) -> ClassificationMode {
        self.mode
    }

    /// Classify a single sensor.
    pub fn classify(
        &self,
        reading: Option<&SensorReading>,
        metadata: Option<&SensorMetadata>,
    ) -> SensorStatus {
        let Some(reading) = reading else {
            return SensorStatus::Offline;
        };

        match reading.status_code {
            StatusCode::NORMAL => SensorStatus::Normal,
            StatusCode::WARNING => SensorStatus::Warning,
            StatusCode::CRITICAL => SensorStatus::Critical,
            _ => match metadata.and_then(SensorMetadata::alarm_range) {
                Some((min_alarm, max_alarm)) => {
                    classify_against_alarms(reading.value.as_f64(), min_alarm, max_alarm)
                }
                None => match self.mode {
                    ClassificationMode::Permissive => SensorStatus::Normal,
                    ClassificationMode::Strict => SensorStatus::Warning,
                },
            },
        }
    }

    /// Classify a sensor by id using the store and catalog.
    pub fn status_of(
        &self,
        store: &SensorStateStore,
        catalog: &Catalog,
        sensor_id: &str,
    ) -> SensorStatus {
        self.classify(store.latest(sensor_id).as_ref(), catalog.get(sensor_id))
    }

    /// Compute aggregate counts.
    pub fn summary(&self, store: &SensorStateStore, catalog: &Catalog) -> SummaryStats {
        store.with_sensors(|sensors| {
            let mut stats = SummaryStats {
                total_sensors: sensors.len(),
                ..SummaryStats::default()
            };
            for state in sensors.values() {
                match state.latest.status_code {
                    StatusCode::NORMAL => stats.normal_sensors += 1,
                    StatusCode::WARNING => stats.warning_alerts += 1,
                    StatusCode::CRITICAL => stats.critical_alerts += 1,
                    _ => {}
                }
            }
            stats.offline_sensors = catalog
                .iter()
                .filter(|m| !sensors.contains_key(&m.sensor_id))
                .count();
            stats
        })
    }

    /// Active alerts, critical first, then newest first.
    pub fn alerts(&self, store: &SensorStateStore, catalog: &Catalog) -> Vec<AlertRecord> {
        let mut alerts: Vec<AlertRecord> = store.with_sensors(|sensors| {
            sensors
                .values()
                .filter_map(|state| {
                    let severity = Severity::from_code(state.latest.status_code)?;
                    Some(build_alert(&state.latest, severity, catalog))
                })
                .collect()
        });
        alerts.sort_by(compare_alerts);
        alerts
    }
}

fn classify_against_alarms(value: f64, min_alarm: f64, max_alarm: f64) -> SensorStatus {
    if value < min_alarm || value > max_alarm {
        return SensorStatus::Critical;
    }
    let band = (max_alarm - min_alarm) * WARNING_BAND;
    if value - min_alarm <= band || max_alarm - value <= band {
        SensorStatus::Warning
    } else {
        SensorStatus::Normal
    }
}

fn build_alert(reading: &SensorReading, severity: Severity, catalog: &Catalog) -> AlertRecord {
    let name = catalog.display_name(&reading.sensor_id);
    let unit = catalog
        .get(&reading.sensor_id)
        .map(SensorMetadata::unit_symbol)
        .unwrap_or("");
    let message = if unit.is_empty() {
        format!("{} is {} at {}", name, severity, reading.value)
    } else {
        format!("{} is {} at {} {}", name, severity, reading.value, unit)
    };

    AlertRecord {
        id: alert_id(&reading.sensor_id, reading.server_timestamp),
        sensor_id: reading.sensor_id.clone(),
        severity,
        message,
        timestamp: reading.server_timestamp,
    }
}

/// Alert id derived from the sensor and the reading's server timestamp.
pub fn alert_id(sensor_id: &str, timestamp: OffsetDateTime) -> String {
    format!("{}@{}", sensor_id, timestamp.unix_timestamp_nanos())
}

fn compare_alerts(a: &AlertRecord, b: &AlertRecord) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.sensor_id.cmp(&b.sensor_id))
}
