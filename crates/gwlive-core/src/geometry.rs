//! Semicircular gauge geometry.
//!
//! Angles are in degrees, measured counter-clockwise from the positive x axis
//! in a y-up frame. The gauge runs from 180° (left, minimum) to 0° (right,
//! maximum). [`arc_path`] converts to SVG's y-down coordinates.

use serde::{Deserialize, Serialize};

/// Angle of the gauge minimum.
pub const START_ANGLE: f64 = 180.0;

/// Angle of the gauge maximum.
pub const END_ANGLE: f64 = 0.0;

/// A 2D point in drawing-surface coordinates (y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate, growing downward.
    pub y: f64,
}

impl Point {
    /// Create a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position of `value` within `[min, max]`, clamped to `[0, 1]`.
///
/// A degenerate scale (`max <= min`) maps everything to 0.
pub fn normalized(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if !value.is_finite() || span.is_nan() || span <= 0.0 {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}

/// Needle angle for `value`: 180° at the minimum, 0° at the maximum.
pub fn value_angle(value: f64, min: f64, max: f64) -> f64 {
    START_ANGLE - START_ANGLE * normalized(value, min, max)
}

/// Point on a circle at `angle` degrees.
pub fn polar(center: Point, radius: f64, angle: f64) -> Point {
    let rad = angle.to_radians();
    Point::new(center.x + radius * rad.cos(), center.y - radius * rad.sin())
}

/// SVG path for the arc from `start_angle` clockwise down to `end_angle`.
///
/// ```
/// use gwlive_core::geometry::{arc_path, Point};
///
/// let path = arc_path(Point::new(100.0, 100.0), 80.0, 180.0, 0.0);
/// assert_eq!(path, "M 20.00 100.00 A 80.00 80.00 0 0 1 180.00 100.00");
/// ```
pub fn arc_path(center: Point, radius: f64, start_angle: f64, end_angle: f64) -> String {
    let start = polar(center, radius, start_angle);
    let end = polar(center, radius, end_angle);
    let large_arc = u8::from((start_angle - end_angle).abs() > 180.0);
    format!(
        "M {:.2} {:.2} A {:.2} {:.2} 0 {} 1 {:.2} {:.2}",
        fix_zero(start.x),
        fix_zero(start.y),
        radius,
        radius,
        large_arc,
        fix_zero(end.x),
        fix_zero(end.y)
    )
}

// Keeps "-0.00" out of formatted paths.
fn fix_zero(v: f64) -> f64 {
    if v.abs() < 0.005 { 0.0 } else { v }
}

/// Gauge fill colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeColor {
    /// Normal.
    Base,
    /// Inside the scale but outside the alarm range.
    Warning,
    /// Outside the scale.
    Danger,
}

/// Colour for `value` given the scale and alarm bounds.
///
/// Without both alarm bounds the gauge is always [`GaugeColor::Base`].
pub fn gauge_color(
    value: f64,
    min: f64,
    max: f64,
    alarm_min: Option<f64>,
    alarm_max: Option<f64>,
) -> GaugeColor {
    let (Some(alarm_min), Some(alarm_max)) = (alarm_min, alarm_max) else {
        return GaugeColor::Base;
    };
    if value < min || value > max {
        GaugeColor::Danger
    } else if value < alarm_min || value > alarm_max {
        GaugeColor::Warning
    } else {
        GaugeColor::Base
    }
}

/// Sizes for drawing a gauge into a surface of a given width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaugeLayout {
    /// Surface width.
    pub width: f64,
    /// Surface height needed for the semicircle.
    pub height: f64,
    /// Arc centre.
    pub center: Point,
    /// Arc radius, measured to the middle of the stroke.
    pub radius: f64,
    /// Arc stroke width.
    pub stroke_width: f64,
    /// Padding on every side.
    pub padding: f64,
}

impl Default for GaugeLayout {
    fn default() -> Self {
        Self::for_width(Self::DEFAULT_WIDTH)
    }
}

impl GaugeLayout {
    /// Surface width used when the renderer does not give one.
    pub const DEFAULT_WIDTH: f64 = 200.0;

    /// Stroke width as a fraction of the surface width.
    pub const STROKE_RATIO: f64 = 0.08;
    /// Padding as a fraction of the surface width.
    pub const PADDING_RATIO: f64 = 0.05;

    /// Layout for a surface `width` units wide. Non-positive widths yield an
    /// all-zero layout.
    pub fn for_width(width: f64) -> Self {
        let width = if width.is_finite() { width.max(0.0) } else { 0.0 };
        let stroke_width = width * Self::STROKE_RATIO;
        let padding = width * Self::PADDING_RATIO;
        let radius = (width / 2.0 - padding - stroke_width / 2.0).max(0.0);
        let center = Point::new(width / 2.0, padding + stroke_width / 2.0 + radius);
        Self {
            width,
            height: center.y + padding,
            center,
            radius,
            stroke_width,
            padding,
        }
    }

    /// Background track from minimum to maximum.
    pub fn track_path(&self) -> String {
        arc_path(self.center, self.radius, START_ANGLE, END_ANGLE)
    }

    /// Value arc from the minimum to `value`.
    pub fn value_path(&self, value: f64, min: f64, max: f64) -> String {
        arc_path(
            self.center,
            self.radius,
            START_ANGLE,
            value_angle(value, min, max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_value_angle_endpoints() {
        assert!(approx(value_angle(0.0, 0.0, 100.0), 180.0));
        assert!(approx(value_angle(50.0, 0.0, 100.0), 90.0));
        assert!(approx(value_angle(100.0, 0.0, 100.0), 0.0));
    }

    #[test]
    fn test_value_angle_clamped() {
        assert!(approx(value_angle(-20.0, 0.0, 100.0), 180.0));
        assert!(approx(value_angle(250.0, 0.0, 100.0), 0.0));
    }

    #[test]
    fn test_degenerate_scale() {
        assert_eq!(normalized(5.0, 10.0, 10.0), 0.0);
        assert_eq!(normalized(5.0, 10.0, 0.0), 0.0);
        assert_eq!(normalized(f64::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_polar_y_down() {
        let c = Point::new(50.0, 50.0);
        let top = polar(c, 10.0, 90.0);
        assert!(approx(top.x, 50.0));
        assert!(approx(top.y, 40.0));
    }

    #[test]
    fn test_arc_path_half() {
        let path = arc_path(Point::new(100.0, 100.0), 80.0, 180.0, 90.0);
        assert_eq!(path, "M 20.00 100.00 A 80.00 80.00 0 0 1 100.00 20.00");
    }

    #[test]
    fn test_arc_path_empty_arc() {
        let path = arc_path(Point::new(0.0, 0.0), 10.0, 180.0, 180.0);
        assert!(path.starts_with("M -10.00 0.00"));
        assert!(path.ends_with("-10.00 0.00"));
    }

    #[test]
    fn test_gauge_color_rule() {
        let color = |v| gauge_color(v, 0.0, 100.0, Some(20.0), Some(80.0));
        assert_eq!(color(50.0), GaugeColor::Base);
        assert_eq!(color(20.0), GaugeColor::Base);
        assert_eq!(color(10.0), GaugeColor::Warning);
        assert_eq!(color(90.0), GaugeColor::Warning);
        assert_eq!(color(-1.0), GaugeColor::Danger);
        assert_eq!(color(101.0), GaugeColor::Danger);
    }

    #[test]
    fn test_gauge_color_requires_both_alarms() {
        assert_eq!(
            gauge_color(500.0, 0.0, 100.0, None, Some(80.0)),
            GaugeColor::Base
        );
        assert_eq!(gauge_color(500.0, 0.0, 100.0, None, None), GaugeColor::Base);
    }

    #[test]
    fn test_layout_scales_with_width() {
        let small = GaugeLayout::for_width(100.0);
        let large = GaugeLayout::for_width(400.0);
        assert!(approx(small.stroke_width, 8.0));
        assert!(approx(large.stroke_width, 32.0));
        assert!(approx(large.radius, small.radius * 4.0));
        assert!(approx(small.center.x, 50.0));
        // Arc fits horizontally.
        assert!(small.center.x - small.radius - small.stroke_width / 2.0 >= small.padding - 1e-9);
    }

    #[test]
    fn test_layout_zero_width() {
        let layout = GaugeLayout::for_width(-5.0);
        assert_eq!(layout.width, 0.0);
        assert_eq!(layout.radius, 0.0);
        assert_eq!(layout.height, 0.0);
    }

    #[test]
    fn test_layout_paths() {
        let layout = GaugeLayout::for_width(200.0);
        assert!(layout.track_path().starts_with("M "));
        assert_ne!(layout.track_path(), layout.value_path(50.0, 0.0, 100.0));
        assert_eq!(layout.track_path(), layout.value_path(100.0, 0.0, 100.0));
    }
}
