//! History-based chart series: line, bar and step.

use serde::Serialize;

use gwlive_types::{HistoryPoint, SensorMetadata, StatusCode};

use super::{ChartData, Domain, axis_domain, time_label};

/// Moving-average window used by the line chart.
pub const MOVING_AVERAGE_WINDOW: usize = 5;

/// One point of a line chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePoint {
    /// `HH:MM:SS` label.
    pub name: String,
    /// Raw value.
    pub value: f64,
    /// Trailing moving average ending at this point.
    pub average: f64,
}

/// Line chart data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    /// Points, oldest first.
    pub points: Vec<LinePoint>,
    /// Padded value-axis domain over raw and averaged values.
    pub domain: Domain,
}

/// One bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarPoint {
    /// `HH:MM:SS` label.
    pub name: String,
    /// Raw value, not cumulative.
    pub value: f64,
}

/// Bar chart data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    /// Bars, oldest first.
    pub points: Vec<BarPoint>,
    /// Padded value-axis domain over raw values.
    pub domain: Domain,
}

/// One step of a step chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPoint {
    /// `HH:MM:SS` label.
    pub x: String,
    /// Numeric value.
    pub y: f64,
    /// Status code at this point.
    pub status: StatusCode,
}

/// Step chart data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSeries {
    /// Steps, oldest first.
    pub points: Vec<StepPoint>,
}

/// Trailing moving average.
///
/// Element `i` is the mean of `values[i + 1 - window ..= i]`, with the window
/// shrinking at the start of the slice. A window of zero is treated as one.
///
/// ```
/// use gwlive_core::charts::moving_average;
///
/// let avg = moving_average(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0], 5);
/// assert_eq!(avg[0], 10.0);
/// assert_eq!(avg[5], 40.0);
/// ```
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let n = (i + 1).min(window);
            values[i + 1 - n..=i].iter().sum::<f64>() / n as f64
        })
        .collect()
}

/// Line chart with a [`MOVING_AVERAGE_WINDOW`]-point trailing average.
pub fn line_chart(history: &[HistoryPoint], metadata: &SensorMetadata) -> ChartData<LineSeries> {
    if history.is_empty() {
        return ChartData::AwaitingData;
    }

    let values: Vec<f64> = history.iter().map(|p| p.numeric_value).collect();
    let averages = moving_average(&values, MOVING_AVERAGE_WINDOW);
    let domain = axis_domain(
        values.iter().chain(averages.iter()).copied(),
        metadata.min_scale,
        metadata.max_scale,
    );

    let points = history
        .iter()
        .zip(averages)
        .map(|(p, average)| LinePoint {
            name: time_label(p.timestamp),
            value: p.numeric_value,
            average,
        })
        .collect();

    ChartData::Ready(LineSeries { points, domain })
}

/// Bar chart, one bar per history point.
pub fn bar_chart(history: &[HistoryPoint], metadata: &SensorMetadata) -> ChartData<BarSeries> {
    if history.is_empty() {
        return ChartData::AwaitingData;
    }

    let domain = axis_domain(
        history.iter().map(|p| p.numeric_value),
        metadata.min_scale,
        metadata.max_scale,
    );
    let points = history
        .iter()
        .map(|p| BarPoint {
            name: time_label(p.timestamp),
            value: p.numeric_value,
        })
        .collect();

    ChartData::Ready(BarSeries { points, domain })
}

/// Step chart carrying the status code of each point.
pub fn step_chart(history: &[HistoryPoint]) -> ChartData<StepSeries> {
    if history.is_empty() {
        return ChartData::AwaitingData;
    }

    let points = history
        .iter()
        .map(|p| StepPoint {
            x: time_label(p.timestamp),
            y: p.numeric_value,
            status: p.status_code,
        })
        .collect();

    ChartData::Ready(StepSeries { points })
}
