//! Masked-subject rasterization.
//!
//! Strokes are applied "destination-out": each one multiplies the subject's
//! alpha by `1 - coverage`. Coverage is the anti-aliased distance field of
//! the flattened centre line (`clamp(r + 0.5 - d, 0, 1)`), which gives round
//! caps and joins for free. Within one stroke overlapping segments take the
//! maximum so a stroke never erases twice over itself.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use kurbo::PathEl;

use layercut_common::error::{LayercutError, LayercutResult};

use crate::stroke::MaskStroke;

/// Largest edge a scaled render may have. The same bound applies to
/// subjects at load time, so a native render always fits.
pub use layercut_document::document::MAX_DIMENSION as MAX_RENDER_DIMENSION;

/// Flattening tolerance in target pixels.
const FLATTEN_TOLERANCE: f64 = 0.1;

/// Render `subject` at `scale` with every stroke erased, in order.
///
/// At `scale == 1.0` the subject bytes are copied untouched before erasing.
pub fn render_masked<'a, I>(subject: &RgbaImage, strokes: I, scale: f64) -> LayercutResult<RgbaImage>
where
    I: IntoIterator<Item = &'a MaskStroke>,
{
    let (width, height) = scaled_size(subject.width(), subject.height(), scale)?;
    let mut out = if (width, height) == subject.dimensions() {
        subject.clone()
    } else {
        imageops::resize(subject, width, height, FilterType::Triangle)
    };

    // Per-axis ratios so the mask lines up with the resized pixels exactly.
    let sx = width as f64 / subject.width() as f64;
    let sy = height as f64 / subject.height() as f64;
    for stroke in strokes {
        erase_stroke(&mut out, stroke, sx, sy);
    }
    Ok(out)
}

/// Output size of a render at `scale`, at least 1x1.
pub fn scaled_size(width: u32, height: u32, scale: f64) -> LayercutResult<(u32, u32)> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(LayercutError::invalid_input(format!(
            "render scale must be positive (got {scale})"
        )));
    }
    let w = (width as f64 * scale).round().max(1.0);
    let h = (height as f64 * scale).round().max(1.0);
    if w > MAX_RENDER_DIMENSION as f64 || h > MAX_RENDER_DIMENSION as f64 {
        return Err(LayercutError::invalid_input(format!(
            "render of {width}x{height} at scale {scale} exceeds {MAX_RENDER_DIMENSION}px"
        )));
    }
    Ok((w as u32, h as u32))
}

/// Apply one stroke to `image`, mapping native coordinates by `(sx, sy)`.
pub fn erase_stroke(image: &mut RgbaImage, stroke: &MaskStroke, sx: f64, sy: f64) {
    let polylines = flatten_scaled(stroke, sx, sy);
    let radius = stroke.width() * (sx + sy) / 4.0;
    let reach = radius + 1.0;

    let bounds = stroke.bounds();
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let x0 = ((bounds.x0 * sx - 1.0).floor() as i64).clamp(0, img_w);
    let y0 = ((bounds.y0 * sy - 1.0).floor() as i64).clamp(0, img_h);
    let x1 = ((bounds.x1 * sx + 1.0).ceil() as i64).clamp(0, img_w);
    let y1 = ((bounds.y1 * sy + 1.0).ceil() as i64).clamp(0, img_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let cols = (x1 - x0) as usize;
    let mut coverage = vec![0.0f32; cols * (y1 - y0) as usize];

    for line in &polylines {
        let segments: Vec<((f64, f64), (f64, f64))> = match line.as_slice() {
            [only] => vec![(*only, *only)],
            pts => pts.windows(2).map(|w| (w[0], w[1])).collect(),
        };
        for (a, b) in segments {
            let sx0 = ((a.0.min(b.0) - reach).floor() as i64).max(x0);
            let sy0 = ((a.1.min(b.1) - reach).floor() as i64).max(y0);
            let sx1 = ((a.0.max(b.0) + reach).ceil() as i64).min(x1);
            let sy1 = ((a.1.max(b.1) + reach).ceil() as i64).min(y1);
            for py in sy0..sy1 {
                for px in sx0..sx1 {
                    let d = distance_to_segment((px as f64 + 0.5, py as f64 + 0.5), a, b);
                    let cov = (radius + 0.5 - d).clamp(0.0, 1.0) as f32;
                    let slot = &mut coverage[(py - y0) as usize * cols + (px - x0) as usize];
                    if cov > *slot {
                        *slot = cov;
                    }
                }
            }
        }
    }

    for (i, cov) in coverage.iter().enumerate() {
        if *cov <= 0.0 {
            continue;
        }
        let px = x0 as u32 + (i % cols) as u32;
        let py = y0 as u32 + (i / cols) as u32;
        let pixel = image.get_pixel_mut(px, py);
        pixel.0[3] = (pixel.0[3] as f32 * (1.0 - cov)).round() as u8;
    }
}

fn flatten_scaled(stroke: &MaskStroke, sx: f64, sy: f64) -> Vec<Vec<(f64, f64)>> {
    let native_tolerance = FLATTEN_TOLERANCE / sx.max(sy).max(f64::EPSILON);
    let mut lines: Vec<Vec<(f64, f64)>> = Vec::new();
    stroke.path().flatten(native_tolerance, |el| match el {
        PathEl::MoveTo(p) => lines.push(vec![(p.x * sx, p.y * sy)]),
        PathEl::LineTo(p) => {
            if let Some(line) = lines.last_mut() {
                line.push((p.x * sx, p.y * sy));
            }
        }
        _ => {}
    });
    lines.retain(|line| !line.is_empty());
    lines
}

fn distance_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (apx, apy) = (p.0 - a.0, p.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    };
    let (dx, dy) = (apx - abx * t, apy - aby * t);
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::stroke_from_points;
    use image::Rgba;
    use layercut_document::viewport::Point2D;

    fn opaque(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]))
    }

    #[test]
    fn test_no_strokes_at_unit_scale_is_identity() {
        let subject = opaque(8, 8);
        let out = render_masked(&subject, std::iter::empty(), 1.0).unwrap();
        assert_eq!(out, subject);
    }

    #[test]
    fn test_dot_erases_disc_with_soft_edge() {
        let subject = opaque(20, 20);
        let stroke = stroke_from_points(&[Point2D::new(10.0, 10.0)], 8.0).unwrap();
        let out = render_masked(&subject, [&stroke], 1.0).unwrap();
        assert_eq!(out.get_pixel(10, 10).0[3], 0);
        assert_eq!(out.get_pixel(0, 0).0[3], 255);
        assert_eq!(out.get_pixel(19, 10).0[3], 255);
        // Pixel centre (13.5, 10.5) is ~3.54 from the dot: partially covered.
        let edge = out.get_pixel(13, 10).0[3];
        assert!(edge > 0 && edge < 255, "edge alpha {edge}");
        // Color survives destination-out.
        assert_eq!(&out.get_pixel(10, 10).0[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_line_stroke_erases_along_path() {
        let subject = opaque(40, 10);
        let stroke =
            stroke_from_points(&[Point2D::new(5.0, 5.0), Point2D::new(35.0, 5.0)], 4.0).unwrap();
        let out = render_masked(&subject, [&stroke], 1.0).unwrap();
        for x in 5..35 {
            assert_eq!(out.get_pixel(x, 4).0[3], 0, "x={x}");
        }
        assert_eq!(out.get_pixel(20, 0).0[3], 255);
        assert_eq!(out.get_pixel(39, 4).0[3], 255);
    }

    #[test]
    fn test_scaled_render_matches_geometry() {
        let subject = opaque(40, 40);
        let stroke = stroke_from_points(&[Point2D::new(20.0, 20.0)], 10.0).unwrap();
        let half = render_masked(&subject, [&stroke], 0.5).unwrap();
        let double = render_masked(&subject, [&stroke], 2.0).unwrap();
        assert_eq!(half.dimensions(), (20, 20));
        assert_eq!(double.dimensions(), (80, 80));
        // Native centre maps to the same relative spot at both scales.
        assert_eq!(half.get_pixel(10, 10).0[3], 0);
        assert_eq!(double.get_pixel(40, 40).0[3], 0);
        // Well outside the 5px native radius at both scales.
        assert_eq!(half.get_pixel(10, 15).0[3], 255);
        assert_eq!(double.get_pixel(40, 59).0[3], 255);
    }

    #[test]
    fn test_stroke_off_canvas_is_ignored() {
        let subject = opaque(10, 10);
        let stroke = stroke_from_points(&[Point2D::new(-50.0, -50.0)], 4.0).unwrap();
        let out = render_masked(&subject, [&stroke], 1.0).unwrap();
        assert_eq!(out, subject);
    }

    #[test]
    fn test_invalid_scale() {
        let subject = opaque(4, 4);
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(render_masked(&subject, std::iter::empty(), scale).is_err());
        }
        assert!(scaled_size(4, 4, 1.0e6).is_err());
    }

    #[test]
    fn test_largest_loadable_subject_renders_at_native_size() {
        assert_eq!(
            scaled_size(MAX_RENDER_DIMENSION, 3, 1.0).unwrap(),
            (MAX_RENDER_DIMENSION, 3)
        );
        let subject = opaque(MAX_RENDER_DIMENSION, 1);
        let out = render_masked(&subject, std::iter::empty(), 1.0).unwrap();
        assert_eq!(out.dimensions(), (MAX_RENDER_DIMENSION, 1));
    }
}
