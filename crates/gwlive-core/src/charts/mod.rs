//! Chart data adapters.
//!
//! One pure function per chart type turns store state plus catalog metadata
//! into the series a renderer needs. Nothing here touches the store; callers
//! pass in the latest reading and/or a history copy.
//!
//! | Chart | Input | Output |
//! |-------|-------|--------|
//! | Gauge | latest reading | [`GaugeData`] |
//! | On/Off | latest reading | [`OnOffData`] |
//! | Step | history | [`StepSeries`] |
//! | Line | history | [`LineSeries`] with moving average |
//! | Bar | history | [`BarSeries`] |
//!
//! Empty input always produces [`ChartData::AwaitingData`], never a
//! zero-filled series.

mod gauge;
mod series;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use gwlive_types::{HistoryPoint, ParseError, SensorMetadata, SensorReading, SensorType};

use crate::geometry::GaugeLayout;

pub use gauge::{GaugeData, GaugePaths, OnOffData, gauge_chart, on_off_chart};
pub use series::{
    BarPoint, BarSeries, LinePoint, LineSeries, MOVING_AVERAGE_WINDOW, StepPoint, StepSeries,
    bar_chart, line_chart, moving_average, step_chart,
};

/// Fraction of the domain span added on each side of a value axis.
pub const DOMAIN_PADDING: f64 = 0.05;

/// Scale used for sensors missing from the catalog.
pub const DEFAULT_SCALE: (f64, f64) = (0.0, 100.0);

/// Result of a chart adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ChartData<T> {
    /// Render-ready data.
    Ready(T),
    /// The sensor has not reported yet.
    AwaitingData,
}

impl<T> ChartData<T> {
    /// Whether data is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, ChartData::Ready(_))
    }

    /// The ready payload, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            ChartData::Ready(data) => Some(data),
            ChartData::AwaitingData => None,
        }
    }

    /// Map the ready payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ChartData<U> {
        match self {
            ChartData::Ready(data) => ChartData::Ready(f(data)),
            ChartData::AwaitingData => ChartData::AwaitingData,
        }
    }
}

/// Chart types supported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Semicircular gauge.
    Gauge,
    /// Line with moving average.
    Line,
    /// Per-point bars.
    Bar,
    /// Step chart with status.
    Step,
    /// On/off indicator.
    OnOff,
}

impl ChartKind {
    /// All chart kinds.
    pub const ALL: [ChartKind; 5] = [
        ChartKind::Gauge,
        ChartKind::Line,
        ChartKind::Bar,
        ChartKind::Step,
        ChartKind::OnOff,
    ];
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Gauge => write!(f, "gauge"),
            ChartKind::Line => write!(f, "line"),
            ChartKind::Bar => write!(f, "bar"),
            ChartKind::Step => write!(f, "step"),
            ChartKind::OnOff => write!(f, "onoff"),
        }
    }
}

impl FromStr for ChartKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gauge" => Ok(ChartKind::Gauge),
            "line" => Ok(ChartKind::Line),
            "bar" => Ok(ChartKind::Bar),
            "step" => Ok(ChartKind::Step),
            "onoff" | "on_off" | "on-off" => Ok(ChartKind::OnOff),
            other => Err(ParseError::InvalidData(format!(
                "unknown chart kind: {}",
                other
            ))),
        }
    }
}

/// Any adapted chart, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Chart {
    /// Gauge data.
    Gauge(GaugeData),
    /// Line series.
    Line(LineSeries),
    /// Bar series.
    Bar(BarSeries),
    /// Step series.
    Step(StepSeries),
    /// On/off state.
    #[serde(rename = "onoff")]
    OnOff(OnOffData),
}

/// Build the chart of the given kind.
///
/// Gauge output carries arc paths computed for `layout`.
pub fn render(
    kind: ChartKind,
    latest: Option<&SensorReading>,
    history: &[HistoryPoint],
    metadata: &SensorMetadata,
    layout: GaugeLayout,
) -> ChartData<Chart> {
    match kind {
        ChartKind::Gauge => gauge_chart(latest, metadata)
            .map(|gauge| gauge.with_layout(layout))
            .map(Chart::Gauge),
        ChartKind::OnOff => on_off_chart(latest).map(Chart::OnOff),
        ChartKind::Line => line_chart(history, metadata).map(Chart::Line),
        ChartKind::Bar => bar_chart(history, metadata).map(Chart::Bar),
        ChartKind::Step => step_chart(history).map(Chart::Step),
    }
}

/// Placeholder metadata for a sensor the catalog does not know.
pub fn default_metadata(sensor_id: &str) -> SensorMetadata {
    let (min, max) = DEFAULT_SCALE;
    SensorMetadata::new(sensor_id, sensor_id, SensorType::Analog, min, max)
}

/// Value-axis domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl Domain {
    /// Create a domain.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the domain.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Domain grown by `fraction` of its span on each side.
    #[must_use]
    pub fn padded(self, fraction: f64) -> Self {
        let margin = self.span() * fraction;
        Self::new(self.min - margin, self.max + margin)
    }
}

/// Domain before padding: the catalog scale when every value fits inside it,
/// otherwise the union of the scale and the data range.
pub fn unpadded_domain(
    values: impl IntoIterator<Item = f64>,
    min_scale: f64,
    max_scale: f64,
) -> Domain {
    let mut data: Option<(f64, f64)> = None;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        data = Some(match data {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        });
    }

    match data {
        Some((data_min, data_max)) if data_min < min_scale || data_max > max_scale => {
            Domain::new(data_min.min(min_scale), data_max.max(max_scale))
        }
        _ => Domain::new(min_scale, max_scale),
    }
}

/// [`unpadded_domain`] with [`DOMAIN_PADDING`] applied.
pub fn axis_domain(
    values: impl IntoIterator<Item = f64>,
    min_scale: f64,
    max_scale: f64,
) -> Domain {
    unpadded_domain(values, min_scale, max_scale).padded(DOMAIN_PADDING)
}

/// `HH:MM:SS` label in UTC.
pub fn time_label(timestamp: OffsetDateTime) -> String {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    format!(
        "{:02}:{:02}:{:02}",
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_types::{SensorKind, StatusCode};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_domain_widens() {
        let d = unpadded_domain([-5.0, 50.0, 120.0], 0.0, 100.0);
        assert_eq!(d, Domain::new(-5.0, 120.0));
    }

    #[test]
    fn test_domain_keeps_scale() {
        let d = unpadded_domain([10.0, 55.0, 90.0], 0.0, 100.0);
        assert_eq!(d, Domain::new(0.0, 100.0));
    }

    #[test]
    fn test_domain_widens_one_side() {
        let d = unpadded_domain([50.0, 130.0], 0.0, 100.0);
        assert_eq!(d, Domain::new(0.0, 130.0));
    }

    #[test]
    fn test_domain_padding() {
        let d = axis_domain([10.0, 90.0], 0.0, 100.0);
        assert!(approx(d.min, -5.0));
        assert!(approx(d.max, 105.0));

        let d = axis_domain([-5.0, 120.0], 0.0, 100.0);
        assert!(approx(d.min, -11.25));
        assert!(approx(d.max, 126.25));
    }

    #[test]
    fn test_domain_ignores_non_finite() {
        let d = unpadded_domain([f64::NAN, 50.0], 0.0, 100.0);
        assert_eq!(d, Domain::new(0.0, 100.0));
    }

    #[test]
    fn test_time_label_utc() {
        let ts = OffsetDateTime::from_unix_timestamp(3_723).unwrap();
        assert_eq!(time_label(ts), "01:02:03");

        let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
        assert_eq!(time_label(ts.to_offset(offset)), "01:02:03");
    }

    #[test]
    fn test_chart_kind_parse() {
        assert_eq!("gauge".parse::<ChartKind>().unwrap(), ChartKind::Gauge);
        assert_eq!("LINE".parse::<ChartKind>().unwrap(), ChartKind::Line);
        assert_eq!("on-off".parse::<ChartKind>().unwrap(), ChartKind::OnOff);
        assert!("pie".parse::<ChartKind>().is_err());
        for kind in ChartKind::ALL {
            assert_eq!(kind.to_string().parse::<ChartKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_chart_data_serialization() {
        let awaiting: ChartData<Chart> = ChartData::AwaitingData;
        assert_eq!(
            serde_json::to_string(&awaiting).unwrap(),
            r#"{"status":"awaiting_data"}"#
        );

        let reading = SensorReading::new(
            "d1",
            true,
            StatusCode::NORMAL,
            SensorKind(1),
            OffsetDateTime::UNIX_EPOCH,
        );
        let chart = render(
            ChartKind::OnOff,
            Some(&reading),
            &[],
            &default_metadata("d1"),
            GaugeLayout::default(),
        );
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["data"]["kind"], "onoff");
        assert_eq!(json["data"]["on"], true);
    }

    #[test]
    fn test_render_awaiting_without_data() {
        let meta = default_metadata("s1");
        for kind in ChartKind::ALL {
            let chart = render(kind, None, &[], &meta, GaugeLayout::default());
            assert!(!chart.is_ready(), "{}", kind);
        }
    }

    #[test]
    fn test_render_gauge_has_paths() {
        let reading = SensorReading::new(
            "s1",
            50.0,
            StatusCode::NORMAL,
            SensorKind(50),
            OffsetDateTime::UNIX_EPOCH,
        );
        let chart = render(
            ChartKind::Gauge,
            Some(&reading),
            &[],
            &default_metadata("s1"),
            GaugeLayout::for_width(300.0),
        );
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["data"]["angle"], 90.0);
        assert_eq!(json["data"]["paths"]["layout"]["width"], 300.0);
        assert!(json["data"]["paths"]["track"].as_str().unwrap().starts_with('M'));
        assert!(json["data"]["paths"]["value"].as_str().unwrap().starts_with('M'));
    }
}
