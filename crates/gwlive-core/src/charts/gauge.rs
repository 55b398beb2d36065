//! Latest-value charts: gauge and on/off.

use serde::Serialize;

use gwlive_types::{SensorMetadata, SensorReading};

use super::ChartData;
use crate::geometry::{GaugeColor, GaugeLayout, gauge_color, value_angle};

/// Gauge chart data.
///
/// `position` is clamped to the scale for drawing; `value` and `label` keep
/// the raw reading so an out-of-range value is still shown as it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeData {
    /// Raw value.
    pub value: f64,
    /// Value clamped into `[min, max]`.
    pub position: f64,
    /// Scale minimum.
    pub min: f64,
    /// Scale maximum.
    pub max: f64,
    /// Lower alarm bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_min: Option<f64>,
    /// Upper alarm bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_max: Option<f64>,
    /// Formatted raw value.
    pub label: String,
    /// Sensor display name.
    pub name: String,
    /// Unit symbol, empty when unknown.
    pub unit: String,
    /// Fill colour.
    pub color: GaugeColor,
    /// Needle angle in degrees (180 at min, 0 at max).
    pub angle: f64,
    /// Arc paths, present once a layout has been applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<GaugePaths>,
}

/// SVG paths for a gauge at a particular size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugePaths {
    /// Layout the paths were computed for.
    pub layout: GaugeLayout,
    /// Full background track.
    pub track: String,
    /// Arc from the minimum to the value.
    pub value: String,
}

impl GaugeData {
    /// Attach arc paths computed for `layout`.
    #[must_use]
    pub fn with_layout(mut self, layout: GaugeLayout) -> Self {
        self.paths = Some(GaugePaths {
            layout,
            track: layout.track_path(),
            value: layout.value_path(self.position, self.min, self.max),
        });
        self
    }
}

/// Gauge chart from the latest reading.
pub fn gauge_chart(
    latest: Option<&SensorReading>,
    metadata: &SensorMetadata,
) -> ChartData<GaugeData> {
    let Some(reading) = latest else {
        return ChartData::AwaitingData;
    };

    let value = reading.value.as_f64();
    let (min, max) = (metadata.min_scale, metadata.max_scale);
    let position = if max > min { value.clamp(min, max) } else { min };

    ChartData::Ready(GaugeData {
        value,
        position,
        min,
        max,
        alarm_min: metadata.min_alarm,
        alarm_max: metadata.max_alarm,
        label: format_value(value),
        name: metadata.name.clone(),
        unit: metadata.unit_symbol().to_string(),
        color: gauge_color(value, min, max, metadata.min_alarm, metadata.max_alarm),
        angle: value_angle(value, min, max),
        paths: None,
    })
}

/// On/off indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnOffData {
    /// Whether the sensor is on.
    pub on: bool,
    /// `"on"` or `"off"`.
    pub label: &'static str,
}

/// On/off chart from the latest reading.
pub fn on_off_chart(latest: Option<&SensorReading>) -> ChartData<OnOffData> {
    match latest {
        Some(reading) => {
            let on = reading.value.is_on();
            ChartData::Ready(OnOffData {
                on,
                label: if on { "on" } else { "off" },
            })
        }
        None => ChartData::AwaitingData,
    }
}

/// Up to two decimals, trailing zeros removed.
fn format_value(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_types::{ReadingValue, SensorKind, SensorType, StatusCode};
    use time::OffsetDateTime;

    fn reading(value: impl Into<ReadingValue>) -> SensorReading {
        SensorReading::new(
            "p1",
            value,
            StatusCode::NORMAL,
            SensorKind(50),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn meta() -> SensorMetadata {
        SensorMetadata::new("p1", "Boiler", SensorType::Analog, 0.0, 100.0)
            .with_alarms(20.0, 80.0)
            .with_unit("bar")
    }

    #[test]
    fn test_gauge_in_range() {
        let gauge = gauge_chart(Some(&reading(50.0)), &meta()).ready().unwrap();
        assert_eq!(gauge.value, 50.0);
        assert_eq!(gauge.position, 50.0);
        assert_eq!(gauge.label, "50");
        assert_eq!(gauge.unit, "bar");
        assert_eq!(gauge.name, "Boiler");
        assert_eq!(gauge.color, GaugeColor::Base);
        assert_eq!(gauge.angle, 90.0);
    }

    #[test]
    fn test_gauge_clamps_position_not_label() {
        let gauge = gauge_chart(Some(&reading(142.5)), &meta()).ready().unwrap();
        assert_eq!(gauge.position, 100.0);
        assert_eq!(gauge.value, 142.5);
        assert_eq!(gauge.label, "142.5");
        assert_eq!(gauge.color, GaugeColor::Danger);
        assert_eq!(gauge.angle, 0.0);

        let gauge = gauge_chart(Some(&reading(-3.0)), &meta()).ready().unwrap();
        assert_eq!(gauge.position, 0.0);
        assert_eq!(gauge.label, "-3");
    }

    #[test]
    fn test_gauge_warning_color() {
        let gauge = gauge_chart(Some(&reading(90.0)), &meta()).ready().unwrap();
        assert_eq!(gauge.color, GaugeColor::Warning);
    }

    #[test]
    fn test_gauge_awaiting() {
        assert_eq!(gauge_chart(None, &meta()), ChartData::AwaitingData);
    }

    #[test]
    fn test_gauge_with_layout() {
        let gauge = gauge_chart(Some(&reading(100.0)), &meta())
            .ready()
            .unwrap()
            .with_layout(GaugeLayout::for_width(200.0));
        let paths = gauge.paths.unwrap();
        assert_eq!(paths.track, paths.value);
    }

    #[test]
    fn test_on_off() {
        assert!(on_off_chart(Some(&reading(true))).ready().unwrap().on);
        assert!(!on_off_chart(Some(&reading(false))).ready().unwrap().on);
        assert!(on_off_chart(Some(&reading(0.2))).ready().unwrap().on);
        let off = on_off_chart(Some(&reading(0.0))).ready().unwrap();
        assert_eq!(off.label, "off");
        assert_eq!(on_off_chart(None), ChartData::AwaitingData);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(23.5), "23.5");
        assert_eq!(format_value(23.456), "23.46");
        assert_eq!(format_value(-0.001), "0");
        assert_eq!(format_value(100.0), "100");
    }
}
