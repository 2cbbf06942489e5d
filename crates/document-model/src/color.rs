//! Color parsing for backgrounds and overlay text.
//!
//! Accepts the CSS subset the editor produces: hex (`#rgb`, `#rgba`,
//! `#rrggbb`, `#rrggbbaa`), `rgb()`/`rgba()`, `transparent`, and a handful
//! of basic names. Parsing is strict; anything else is `None` and the
//! caller decides which error that maps to.

use image::Rgba;

const NAMED: &[(&str, [u8; 4])] = &[
    ("transparent", [0, 0, 0, 0]),
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 128, 0, 255]),
    ("lime", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
];

/// Parse a CSS color string into straight (non-premultiplied) RGBA.
pub fn parse_color(input: &str) -> Option<Rgba<u8>> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_function(args);
    }
    NAMED
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, rgba)| Rgba(*rgba))
}

/// Format as `#rrggbbaa` (or `#rrggbb` when opaque).
pub fn to_hex(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{r:02x}{g:02x}{b:02x}")
    } else {
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        4 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?])),
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

fn parse_rgb_function(args: &str) -> Option<Rgba<u8>> {
    // Both `rgb(1, 2, 3)` and `rgb(1 2 3 / 0.5)` spellings.
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let mut channels = [0u8; 4];
    for (slot, part) in channels.iter_mut().zip(parts.iter()).take(3) {
        *slot = parse_channel(part)?;
    }
    channels[3] = match parts.get(3) {
        Some(alpha) => parse_alpha(alpha)?,
        None => 255,
    };
    Some(Rgba(channels))
}

fn parse_channel(part: &str) -> Option<u8> {
    let value = if let Some(pct) = part.strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0 * 255.0
    } else {
        part.parse::<f64>().ok()?
    };
    if !value.is_finite() || !(0.0..=255.0).contains(&value) {
        return None;
    }
    Some(value.round() as u8)
}

fn parse_alpha(part: &str) -> Option<u8> {
    let value = if let Some(pct) = part.strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0
    } else {
        part.parse::<f64>().ok()?
    };
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return None;
    }
    Some((value * 255.0).round() as u8)
}
