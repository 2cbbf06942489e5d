//! Erase stroke capture and smoothing.
//!
//! Samples are stored in native pixels together with a native brush width,
//! fixed at capture time. The drawable path is a quadratic midpoint curve:
//! each raw sample becomes a control point and the curve passes through the
//! midpoints between consecutive samples, which rounds off the corners of a
//! jittery pointer trace without lagging behind it.

use kurbo::{BezPath, Point, Rect};
use serde::{Deserialize, Serialize};

use layercut_common::error::{LayercutError, LayercutResult};
use layercut_document::viewport::Point2D;

/// Serialized form of a stroke, in native pixels.
///
/// ```json
/// {"width": 24.0, "points": [[10.0, 12.0], [40.0, 18.5]]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub width: f64,
    pub points: Vec<[f64; 2]>,
}

impl StrokeRecord {
    pub fn points(&self) -> Vec<Point2D> {
        self.points.iter().map(|[x, y]| Point2D::new(*x, *y)).collect()
    }
}

/// A committed erase stroke. Immutable once built.
#[derive(Debug, Clone)]
pub struct MaskStroke {
    samples: Vec<Point2D>,
    path: BezPath,
    width: f64,
}

impl MaskStroke {
    /// Raw (deduplicated) native samples.
    pub fn samples(&self) -> &[Point2D] {
        &self.samples
    }

    /// Smoothed centre line in native pixels.
    pub fn path(&self) -> &BezPath {
        &self.path
    }

    /// Brush diameter in native pixels.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Native-space bounds of the painted area, including the brush radius.
    pub fn bounds(&self) -> Rect {
        stroke_bounds(&self.samples, self.width)
    }

    pub fn to_record(&self) -> StrokeRecord {
        StrokeRecord {
            width: self.width,
            points: self.samples.iter().map(|p| [p.x, p.y]).collect(),
        }
    }
}

/// Accumulates samples for the stroke currently being drawn.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    samples: Vec<Point2D>,
    width: f64,
}

impl StrokeBuilder {
    /// Open a stroke at `start` with a native brush `width`.
    pub fn new(start: Point2D, width: f64) -> LayercutResult<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(LayercutError::invalid_input(format!(
                "brush width must be positive (got {width})"
            )));
        }
        check_point(start)?;
        Ok(Self {
            samples: vec![start],
            width,
        })
    }

    /// Append a sample. Returns `false` if it repeats the previous one.
    pub fn push(&mut self, point: Point2D) -> LayercutResult<bool> {
        check_point(point)?;
        if self.samples.last() == Some(&point) {
            return Ok(false);
        }
        self.samples.push(point);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Stroke as drawn so far, for live preview.
    pub fn preview(&self) -> MaskStroke {
        MaskStroke {
            path: smooth_path(&self.samples),
            samples: self.samples.clone(),
            width: self.width,
        }
    }

    /// Close the stroke. `None` if no samples were recorded.
    pub fn finish(self) -> Option<MaskStroke> {
        if self.samples.is_empty() {
            return None;
        }
        Some(MaskStroke {
            path: smooth_path(&self.samples),
            samples: self.samples,
            width: self.width,
        })
    }
}

/// Build a stroke straight from native samples (imported strokes).
pub fn stroke_from_points(points: &[Point2D], width: f64) -> LayercutResult<MaskStroke> {
    let (first, rest) = points
        .split_first()
        .ok_or_else(|| LayercutError::invalid_input("stroke has no points"))?;
    let mut builder = StrokeBuilder::new(*first, width)?;
    for point in rest {
        builder.push(*point)?;
    }
    builder
        .finish()
        .ok_or_else(|| LayercutError::invalid_input("stroke has no points"))
}

/// Quadratic midpoint smoothing through `samples`.
///
/// A single sample yields a zero-length segment, which renders as a round dot.
pub fn smooth_path(samples: &[Point2D]) -> BezPath {
    let mut path = BezPath::new();
    let pts: Vec<Point> = samples.iter().map(|p| Point::new(p.x, p.y)).collect();
    match pts.as_slice() {
        [] => {}
        [only] => {
            path.move_to(*only);
            path.line_to(*only);
        }
        [a, b] => {
            path.move_to(*a);
            path.line_to(*b);
        }
        [first, .., last] => {
            path.move_to(*first);
            path.line_to(first.midpoint(pts[1]));
            for pair in pts[1..].windows(2) {
                path.quad_to(pair[0], pair[0].midpoint(pair[1]));
            }
            path.line_to(*last);
        }
    }
    path
}

fn stroke_bounds(samples: &[Point2D], width: f64) -> Rect {
    let r = width / 2.0;
    let mut rect = Rect::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in samples {
        rect.x0 = rect.x0.min(p.x - r);
        rect.y0 = rect.y0.min(p.y - r);
        rect.x1 = rect.x1.max(p.x + r);
        rect.y1 = rect.y1.max(p.y + r);
    }
    rect
}

fn check_point(point: Point2D) -> LayercutResult<()> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(LayercutError::invalid_input("stroke point must be finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::PathEl;

    #[test]
    fn test_duplicates_dropped() {
        let mut b = StrokeBuilder::new(Point2D::new(1.0, 1.0), 4.0).unwrap();
        assert!(!b.push(Point2D::new(1.0, 1.0)).unwrap());
        assert!(b.push(Point2D::new(2.0, 1.0)).unwrap());
        assert!(!b.push(Point2D::new(2.0, 1.0)).unwrap());
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_invalid_width_and_points() {
        assert!(StrokeBuilder::new(Point2D::new(0.0, 0.0), 0.0).is_err());
        assert!(StrokeBuilder::new(Point2D::new(0.0, 0.0), f64::NAN).is_err());
        assert!(StrokeBuilder::new(Point2D::new(f64::INFINITY, 0.0), 2.0).is_err());
        let mut b = StrokeBuilder::new(Point2D::new(0.0, 0.0), 2.0).unwrap();
        assert!(b.push(Point2D::new(0.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_single_sample_is_a_dot() {
        let path = smooth_path(&[Point2D::new(5.0, 5.0)]);
        let els = path.elements();
        assert_eq!(els.len(), 2);
        assert_eq!(els[1], PathEl::LineTo(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_midpoint_smoothing_shape() {
        let samples = [
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ];
        let path = smooth_path(&samples);
        let els = path.elements();
        assert_eq!(els[0], PathEl::MoveTo(Point::new(0.0, 0.0)));
        assert_eq!(els[1], PathEl::LineTo(Point::new(5.0, 0.0)));
        assert_eq!(
            els[2],
            PathEl::QuadTo(Point::new(10.0, 0.0), Point::new(10.0, 5.0))
        );
        assert_eq!(els[3], PathEl::LineTo(Point::new(10.0, 10.0)));
    }

    #[test]
    fn test_record_roundtrip_preserves_samples() {
        let stroke = stroke_from_points(
            &[Point2D::new(1.0, 2.0), Point2D::new(3.0, 4.0)],
            6.0,
        )
        .unwrap();
        let json = serde_json::to_string(&stroke.to_record()).unwrap();
        let back: StrokeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, 6.0);
        assert_eq!(back.points(), stroke.samples());
    }

    #[test]
    fn test_bounds_include_radius() {
        let stroke = stroke_from_points(&[Point2D::new(10.0, 10.0)], 4.0).unwrap();
        let b = stroke.bounds();
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (8.0, 8.0, 12.0, 12.0));
    }

    #[test]
    fn test_empty_import_rejected() {
        assert!(stroke_from_points(&[], 4.0).is_err());
    }
}
