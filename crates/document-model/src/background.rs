//! Background layer variants.
//!
//! [`BackgroundSpec`] is what callers hand in (strings and encoded bytes);
//! [`BackgroundLayer`] is the validated, ready-to-rasterize form stored in
//! the document. Conversion happens once, in [`BackgroundLayer::resolve`],
//! so a malformed spec is rejected before it can replace a good background.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use layercut_common::error::{LayercutError, LayercutResult};

use crate::color::parse_color;
use crate::viewport::Point2D;

/// Caller-facing background description.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSpec {
    Transparent,
    /// Any color accepted by [`parse_color`].
    Color(String),
    /// Color stops (each optionally followed by a `NN%` offset) and a CSS
    /// direction such as `to right`, `135deg` or `0.25turn`.
    Gradient {
        stops: Vec<String>,
        direction: String,
    },
    /// Encoded image bytes (PNG/JPEG). Provenance is irrelevant.
    Image(Vec<u8>),
}

impl BackgroundSpec {
    /// Parse `transparent`, a color, or `linear-gradient(...)`.
    pub fn parse_css(input: &str) -> LayercutResult<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower == "transparent" || lower == "none" {
            return Ok(Self::Transparent);
        }
        if let Some(body) = lower
            .strip_prefix("linear-gradient(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let args = split_top_level(body);
            let mut iter = args.into_iter().peekable();
            let direction = match iter.peek() {
                Some(first) if parse_direction(first).is_some() => iter.next().unwrap_or_default(),
                _ => String::new(),
            };
            return Ok(Self::Gradient {
                stops: iter.collect(),
                direction,
            });
        }
        if parse_color(trimmed).is_some() {
            return Ok(Self::Color(trimmed.to_string()));
        }
        Err(LayercutError::unsupported_background(format!(
            "unrecognized background {trimmed:?}"
        )))
    }
}

/// A color stop with a resolved offset in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Rgba<u8>,
}

/// A linear gradient in CSS angle convention: 0° points up, 90° right.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    stops: Vec<GradientStop>,
    angle_deg: f64,
}

impl LinearGradient {
    /// Build from raw stop strings and a CSS direction.
    pub fn parse(stops: &[String], direction: &str) -> LayercutResult<Self> {
        let angle_deg = parse_direction(direction).ok_or_else(|| {
            LayercutError::unsupported_background(format!("bad gradient direction {direction:?}"))
        })?;
        if stops.len() < 2 {
            return Err(LayercutError::unsupported_background(
                "gradient needs at least two color stops",
            ));
        }

        let mut colors = Vec::with_capacity(stops.len());
        let mut offsets = Vec::with_capacity(stops.len());
        for raw in stops {
            let (color, offset) = parse_stop(raw).ok_or_else(|| {
                LayercutError::unsupported_background(format!("bad gradient stop {raw:?}"))
            })?;
            colors.push(color);
            offsets.push(offset);
        }

        let offsets = resolve_offsets(&offsets);
        Ok(Self {
            stops: colors
                .into_iter()
                .zip(offsets)
                .map(|(color, offset)| GradientStop { offset, color })
                .collect(),
            angle_deg,
        })
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    /// Start and end of the gradient line for a `width` x `height` box.
    ///
    /// The four axis-aligned directions come from a table so they are exact;
    /// every other angle uses the CSS gradient-line length
    /// `|w sin a| + |h cos a|` centred on the box.
    pub fn endpoints(&self, width: f64, height: f64) -> (Point2D, Point2D) {
        let (cx, cy) = (width / 2.0, height / 2.0);
        let axis = match self.angle_deg {
            a if a == 0.0 => Some(((cx, height), (cx, 0.0))),
            a if a == 90.0 => Some(((0.0, cy), (width, cy))),
            a if a == 180.0 => Some(((cx, 0.0), (cx, height))),
            a if a == 270.0 => Some(((width, cy), (0.0, cy))),
            _ => None,
        };
        if let Some(((x0, y0), (x1, y1))) = axis {
            return (Point2D::new(x0, y0), Point2D::new(x1, y1));
        }

        let rad = self.angle_deg.to_radians();
        let (dx, dy) = (rad.sin(), -rad.cos());
        let half = (width * dx.abs() + height * dy.abs()) / 2.0;
        (
            Point2D::new(cx - dx * half, cy - dy * half),
            Point2D::new(cx + dx * half, cy + dy * half),
        )
    }

    /// Interpolated color at position `t` along the gradient line.
    pub fn color_at(&self, t: f64) -> Rgba<u8> {
        let first = self.stops[0];
        if t <= first.offset {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= f64::EPSILON {
                    return b.color;
                }
                let f = (t - a.offset) / span;
                let mut out = [0u8; 4];
                for (i, channel) in out.iter_mut().enumerate() {
                    let v = a.color.0[i] as f64 + (b.color.0[i] as f64 - a.color.0[i] as f64) * f;
                    *channel = v.round().clamp(0.0, 255.0) as u8;
                }
                return Rgba(out);
            }
        }
        self.stops[self.stops.len() - 1].color
    }
}

/// Validated background stored in the document.
#[derive(Debug, Clone)]
pub enum BackgroundLayer {
    Transparent,
    Color(Rgba<u8>),
    Gradient(LinearGradient),
    Image(Arc<RgbaImage>),
}

impl BackgroundLayer {
    /// Validate and decode a caller spec.
    pub fn resolve(spec: &BackgroundSpec) -> LayercutResult<Self> {
        match spec {
            BackgroundSpec::Transparent => Ok(Self::Transparent),
            BackgroundSpec::Color(raw) => parse_color(raw).map(Self::Color).ok_or_else(|| {
                LayercutError::unsupported_background(format!("bad color {raw:?}"))
            }),
            BackgroundSpec::Gradient { stops, direction } => {
                LinearGradient::parse(stops, direction).map(Self::Gradient)
            }
            BackgroundSpec::Image(bytes) => {
                let decoded = image::load_from_memory(bytes).map_err(|e| {
                    LayercutError::decode(format!("background image: {e}"))
                })?;
                let rgba = decoded.to_rgba8();
                if rgba.width() == 0 || rgba.height() == 0 {
                    return Err(LayercutError::decode("background image has zero size"));
                }
                Ok(Self::Image(Arc::new(rgba)))
            }
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transparent => "transparent",
            Self::Color(_) => "color",
            Self::Gradient(_) => "gradient",
            Self::Image(_) => "image",
        }
    }
}

impl Default for BackgroundLayer {
    fn default() -> Self {
        Self::Transparent
    }
}

/// Parse a CSS gradient direction into degrees in `[0, 360)`.
///
/// An empty string means the CSS default, `to bottom`.
pub fn parse_direction(input: &str) -> Option<f64> {
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Some(180.0);
    }
    if let Some(sides) = s.strip_prefix("to ") {
        let mut words: Vec<&str> = sides.split_whitespace().collect();
        words.sort_unstable();
        let deg = match words.as_slice() {
            ["top"] => 0.0,
            ["right"] => 90.0,
            ["bottom"] => 180.0,
            ["left"] => 270.0,
            ["right", "top"] => 45.0,
            ["bottom", "right"] => 135.0,
            ["bottom", "left"] => 225.0,
            ["left", "top"] => 315.0,
            _ => return None,
        };
        return Some(deg);
    }

    let (number, unit_to_deg) = if let Some(n) = s.strip_suffix("deg") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("grad") {
        (n, 0.9)
    } else if let Some(n) = s.strip_suffix("rad") {
        (n, 180.0 / std::f64::consts::PI)
    } else if let Some(n) = s.strip_suffix("turn") {
        (n, 360.0)
    } else {
        (s.as_str(), 1.0)
    };
    let value = number.trim().parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value * unit_to_deg).rem_euclid(360.0))
}

fn parse_stop(raw: &str) -> Option<(Rgba<u8>, Option<f64>)> {
    let raw = raw.trim();
    if let Some((color_part, offset_part)) = raw.rsplit_once(char::is_whitespace) {
        if let Some(pct) = offset_part.strip_suffix('%') {
            let offset = pct.parse::<f64>().ok().filter(|v| v.is_finite())? / 100.0;
            return Some((parse_color(color_part)?, Some(offset)));
        }
    }
    Some((parse_color(raw)?, None))
}

/// Fill missing offsets: first defaults to 0, last to 1, interior gaps are
/// spaced evenly between their known neighbours; offsets never decrease.
fn resolve_offsets(raw: &[Option<f64>]) -> Vec<f64> {
    let n = raw.len();
    let mut out: Vec<Option<f64>> = raw.to_vec();
    if out[0].is_none() {
        out[0] = Some(0.0);
    }
    if out[n - 1].is_none() {
        out[n - 1] = Some(1.0);
    }

    let mut running = f64::NEG_INFINITY;
    for slot in out.iter_mut().flatten() {
        running = running.max(*slot);
        *slot = running;
    }

    let mut i = 0;
    while i < n {
        if out[i].is_some() {
            i += 1;
            continue;
        }
        let start = i - 1;
        let mut end = i;
        while out[end].is_none() {
            end += 1;
        }
        let (a, b) = (out[start].unwrap_or(0.0), out[end].unwrap_or(1.0));
        let steps = (end - start) as f64;
        for (k, slot) in out.iter_mut().enumerate().take(end).skip(i) {
            *slot = Some(a + (b - a) * (k - start) as f64 / steps);
        }
        i = end;
    }

    out.into_iter().map(|o| o.unwrap_or(0.0)).collect()
}

/// Split on commas that are not inside parentheses.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
