//! Overlay text rasterization.
//!
//! Fonts are registered explicitly in a [`FontBook`]; nothing is discovered
//! from the system. Text is laid out line by line with kerning, rasterized
//! into a single-channel coverage mask, and painted by the compositor. Bold
//! and italic are synthesized when no matching face is registered.

use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use layercut_common::config::FontConfig;
use layercut_common::error::{LayercutError, LayercutResult};
use layercut_document::overlay::TextAlign;

/// Horizontal shear applied by synthetic italics.
const ITALIC_SHEAR: f32 = 0.2;

/// Padding around rasterized text, in pixels.
const MASK_PAD: i32 = 2;

/// One registered face.
#[derive(Clone)]
struct FontFace {
    family: String,
    weight: u16,
    italic: bool,
    font: FontArc,
}

/// A face picked for a style, plus what has to be synthesized.
#[derive(Clone)]
pub struct ResolvedFont<'a> {
    pub font: &'a FontArc,
    pub family: &'a str,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Registered fonts, looked up by family name.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: Vec<FontFace>,
    default_family: Option<String>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every font file listed in the config. Unreadable files are
    /// logged and skipped.
    pub fn from_config(config: &FontConfig) -> Self {
        let mut book = Self::new();
        for path in &config.files {
            if let Err(e) = book.register_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Skipping font");
            }
        }
        book.default_family = config.default_family.clone();
        book
    }

    /// Register a face from raw TTF/OTF bytes.
    pub fn register_bytes(
        &mut self,
        family: &str,
        weight: u16,
        italic: bool,
        bytes: Vec<u8>,
    ) -> LayercutResult<()> {
        if family.trim().is_empty() {
            return Err(LayercutError::invalid_input("font family is empty"));
        }
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| LayercutError::invalid_input(format!("invalid font data: {e}")))?;
        tracing::debug!(family, weight, italic, "Font registered");
        self.faces.push(FontFace {
            family: family.trim().to_string(),
            weight,
            italic,
            font,
        });
        Ok(())
    }

    /// Register a font file. Family and style are taken from the file name,
    /// e.g. `Inter-BoldItalic.ttf` is family `Inter`, weight 700, italic.
    pub fn register_file(&mut self, path: &Path) -> LayercutResult<()> {
        let bytes = std::fs::read(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LayercutError::invalid_input("font path has no file name"))?;
        let (family, weight, italic) = style_from_file_stem(stem);
        self.register_bytes(&family, weight, italic, bytes)
    }

    pub fn set_default_family(&mut self, family: Option<String>) {
        self.default_family = family;
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Pick a face for a CSS-style family list.
    ///
    /// Tries the whole string, then each comma-separated entry, then the
    /// default family, then any registered face. `None` only when empty.
    pub fn resolve(&self, families: &str, weight: u16, italic: bool) -> Option<ResolvedFont<'_>> {
        let mut candidates: Vec<String> = vec![unquote(families)];
        candidates.extend(families.split(',').map(unquote));
        candidates.extend(self.default_family.iter().map(|f| unquote(f)));

        let face = candidates
            .iter()
            .filter(|c| !c.is_empty())
            .find_map(|family| {
                best_match(
                    self.faces.iter().filter(|f| f.family.eq_ignore_ascii_case(family)),
                    weight,
                    italic,
                )
            })
            .or_else(|| best_match(self.faces.iter(), weight, italic))?;

        if !candidates.iter().any(|c| face.family.eq_ignore_ascii_case(c)) {
            tracing::debug!(requested = families, using = %face.family, "Font fallback");
        }

        Some(ResolvedFont {
            font: &face.font,
            family: &face.family,
            synthetic_bold: weight >= 600 && face.weight < 600,
            synthetic_italic: italic && !face.italic,
        })
    }
}

/// Closest face by slant first, then by weight distance.
fn best_match<'a>(
    faces: impl Iterator<Item = &'a FontFace>,
    weight: u16,
    italic: bool,
) -> Option<&'a FontFace> {
    faces.min_by_key(|f| {
        (
            (f.italic != italic) as u32,
            (f.weight as i32 - weight as i32).unsigned_abs(),
        )
    })
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field(
                "faces",
                &self
                    .faces
                    .iter()
                    .map(|face| (face.family.as_str(), face.weight, face.italic))
                    .collect::<Vec<_>>(),
            )
            .field("default_family", &self.default_family)
            .finish()
    }
}

fn unquote(name: &str) -> String {
    name.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

/// Guess `(family, weight, italic)` from a font file stem.
pub fn style_from_file_stem(stem: &str) -> (String, u16, bool) {
    let (family, style) = match stem.rsplit_once('-') {
        Some((family, style)) => (family, style.to_ascii_lowercase()),
        None => (stem, String::new()),
    };
    let weight = if style.contains("black") || style.contains("heavy") {
        900
    } else if style.contains("extrabold") || style.contains("ultrabold") {
        800
    } else if style.contains("semibold") || style.contains("demibold") {
        600
    } else if style.contains("bold") {
        700
    } else if style.contains("medium") {
        500
    } else if style.contains("light") {
        300
    } else if style.contains("thin") {
        100
    } else {
        400
    };
    let italic = style.contains("italic") || style.contains("oblique");
    (family.to_string(), weight, italic)
}

/// Largest em size, in output pixels, that will be rasterized. Each glyph
/// outline allocates a buffer of its own pixel size.
pub const MAX_RASTER_EM: f32 = 16384.0;

/// Largest shadow blur radius, in output pixels.
pub const MAX_RASTER_BLUR: f32 = 4096.0;

/// Largest shadow offset on either axis, in output pixels.
pub const MAX_RASTER_OFFSET: f32 = 1_000_000.0;

/// Above this sigma, shadows are blurred at reduced resolution.
const DIRECT_BLUR_SIGMA: f32 = 4.0;

/// Check shadow parameters before anything is rasterized for them.
pub fn check_shadow(offset_x: f32, offset_y: f32, blur: f32) -> LayercutResult<()> {
    if !(offset_x.is_finite() && offset_y.is_finite() && blur.is_finite()) {
        return Err(LayercutError::render("shadow values must be finite"));
    }
    if !(0.0..=MAX_RASTER_BLUR).contains(&blur) {
        return Err(LayercutError::render(format!(
            "shadow blur {blur} outside 0..={MAX_RASTER_BLUR}"
        )));
    }
    if offset_x.abs() > MAX_RASTER_OFFSET || offset_y.abs() > MAX_RASTER_OFFSET {
        return Err(LayercutError::render(format!(
            "shadow offset beyond {MAX_RASTER_OFFSET}px"
        )));
    }
    Ok(())
}

/// How far a shadow with blur radius `blur` spreads past its source pixels.
pub fn shadow_margin(blur: f32) -> i32 {
    let sigma = blur / 2.0;
    if sigma > 0.0 {
        (sigma * 3.0).ceil() as i32 + 1
    } else {
        0
    }
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` that text masks are cut to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl ClipRect {
    /// The whole canvas.
    pub fn canvas(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: i32::try_from(width).unwrap_or(i32::MAX),
            y1: i32::try_from(height).unwrap_or(i32::MAX),
        }
    }

    /// Grow by `by` pixels on every side.
    pub fn expand(self, by: i32) -> Self {
        let by = by.max(0);
        Self {
            x0: self.x0.saturating_sub(by),
            y0: self.y0.saturating_sub(by),
            x1: self.x1.saturating_add(by),
            y1: self.y1.saturating_add(by),
        }
    }

    /// Move by `(dx, dy)` pixels.
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0.saturating_add(dx),
            y0: self.y0.saturating_add(dy),
            x1: self.x1.saturating_add(dx),
            y1: self.y1.saturating_add(dy),
        }
    }

    /// Intersect with a float box, rounding outwards. `None` when the box is
    /// not finite or misses the clip.
    fn cut(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<ClipRect> {
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        let x0 = min_x.floor().max(self.x0 as f64) as i32;
        let y0 = min_y.floor().max(self.y0 as f64) as i32;
        let x1 = max_x.ceil().min(self.x1 as f64) as i32;
        let y1 = max_y.ceil().min(self.y1 as f64) as i32;
        (x1 > x0 && y1 > y0).then_some(ClipRect { x0, y0, x1, y1 })
    }

    fn width(&self) -> u32 {
        (self.x1 as i64 - self.x0 as i64) as u32
    }

    fn height(&self) -> u32 {
        (self.y1 as i64 - self.y0 as i64) as u32
    }
}

/// A coverage mask placed in canvas pixel coordinates.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    pub x: i32,
    pub y: i32,
    pub mask: GrayImage,
}

impl CoverageMask {
    /// A blurred, offset copy for drop shadows, cut to `clip`. `blur`
    /// follows the CSS convention: the Gaussian sigma is half the radius.
    ///
    /// Only source pixels within [`shadow_margin`] of `clip` are blurred, so
    /// the work is bounded by the clip, not by the text size.
    /// `Ok(None)` when the shadow lands entirely outside `clip`.
    pub fn shadow(
        &self,
        offset_x: f32,
        offset_y: f32,
        blur: f32,
        clip: ClipRect,
    ) -> LayercutResult<Option<CoverageMask>> {
        check_shadow(offset_x, offset_y, blur)?;
        let margin = shadow_margin(blur);

        // Unblurred shadow position, then its full blurred extent.
        let left = self.x as i64 + offset_x.round() as i64;
        let top = self.y as i64 + offset_y.round() as i64;
        let (w, h) = (self.mask.width() as i64, self.mask.height() as i64);
        let m = margin as i64;
        let extent = (
            (left - m) as f64,
            (top - m) as f64,
            (left + w + m) as f64,
            (top + h + m) as f64,
        );
        let Some(visible) = clip.cut(extent.0, extent.1, extent.2, extent.3) else {
            return Ok(None);
        };
        let Some(work) = visible
            .expand(margin)
            .cut(extent.0, extent.1, extent.2, extent.3)
        else {
            return Ok(None);
        };

        let mut buffer = GrayImage::new(work.width(), work.height());
        imageops::replace(
            &mut buffer,
            &self.mask,
            left - work.x0 as i64,
            top - work.y0 as i64,
        );
        let blurred = blur_coverage(&buffer, blur / 2.0);

        let mask = imageops::crop_imm(
            &blurred,
            (visible.x0 - work.x0) as u32,
            (visible.y0 - work.y0) as u32,
            visible.width(),
            visible.height(),
        )
        .to_image();
        Ok(Some(CoverageMask {
            x: visible.x0,
            y: visible.y0,
            mask,
        }))
    }
}

/// Gaussian blur whose cost does not grow with `sigma`: wide blurs run on a
/// downscaled copy and are scaled back up.
fn blur_coverage(mask: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return mask.clone();
    }
    if sigma <= DIRECT_BLUR_SIGMA {
        return imageops::blur(mask, sigma);
    }
    let factor = (sigma / (DIRECT_BLUR_SIGMA / 2.0)).floor().max(1.0);
    let (w, h) = mask.dimensions();
    let small_w = ((w as f32 / factor).ceil() as u32).max(1);
    let small_h = ((h as f32 / factor).ceil() as u32).max(1);
    let small = imageops::resize(mask, small_w, small_h, FilterType::Triangle);
    let small = imageops::blur(&small, sigma / factor);
    imageops::resize(&small, w, h, FilterType::Triangle)
}

/// Layout and style parameters for one text block.
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    /// Em size in output pixels.
    pub size: f32,
    pub align: TextAlign,
    /// Anchor in output pixels: the alignment edge horizontally, the block
    /// centre vertically.
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub bold: bool,
    pub italic: bool,
}

/// Rasterize `text` into a coverage mask cut to `clip`.
///
/// `Ok(None)` if nothing is visible: empty or whitespace-only text, or text
/// entirely outside `clip`. Sizes above [`MAX_RASTER_EM`] are a render error.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    layout: &TextLayout,
    clip: ClipRect,
) -> LayercutResult<Option<CoverageMask>> {
    if !(layout.size.is_finite() && layout.size > 0.0) || layout.size > MAX_RASTER_EM {
        return Err(LayercutError::render(format!(
            "text size {} outside 0..={MAX_RASTER_EM}",
            layout.size
        )));
    }
    if !(layout.anchor_x.is_finite() && layout.anchor_y.is_finite()) {
        return Ok(None);
    }

    let scaled = font.as_scaled(layout.size);
    let ascent = scaled.ascent();
    let line_height = scaled.height() + scaled.line_gap();
    let lines: Vec<&str> = text.split('\n').collect();
    let block_top = layout.anchor_y - line_height * lines.len() as f32 / 2.0;

    // (glyph, x, baseline)
    let mut glyphs: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let baseline = block_top + i as f32 * line_height + ascent;
        let mut cursor_x = 0.0f32;
        let mut prev: Option<GlyphId> = None;
        let start = glyphs.len();
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(p) = prev {
                cursor_x += scaled.kern(p, id);
            }
            glyphs.push((id, cursor_x, baseline));
            cursor_x += scaled.h_advance(id);
            prev = Some(id);
        }
        let line_x = match layout.align {
            TextAlign::Left => layout.anchor_x,
            TextAlign::Center => layout.anchor_x - cursor_x / 2.0,
            TextAlign::Right => layout.anchor_x - cursor_x,
        };
        for glyph in &mut glyphs[start..] {
            glyph.1 += line_x;
        }
    }

    let bold_radius = if layout.bold {
        (layout.size / 32.0).round().max(1.0) as i32
    } else {
        0
    };
    let shear_reach = if layout.italic {
        (ascent.abs() * ITALIC_SHEAR).ceil() as i32
    } else {
        0
    };
    let reach = (MASK_PAD + bold_radius + shear_reach) as f64;

    // Glyphs that cannot touch the clip are never outlined.
    let outlines: Vec<_> = glyphs
        .iter()
        .filter_map(|&(id, x, baseline)| {
            font.outline_glyph(id.with_scale_and_position(layout.size, point(x, baseline)))
                .map(|outline| (outline, baseline))
        })
        .filter(|(outline, _)| {
            let b = outline.px_bounds();
            clip.cut(
                b.min.x as f64 - reach,
                b.min.y as f64 - reach,
                b.max.x as f64 + reach,
                b.max.y as f64 + reach,
            )
            .is_some()
        })
        .collect();
    if outlines.is_empty() {
        return Ok(None);
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (outline, _) in &outlines {
        let b = outline.px_bounds();
        min_x = min_x.min(b.min.x as f64);
        min_y = min_y.min(b.min.y as f64);
        max_x = max_x.max(b.max.x as f64);
        max_y = max_y.max(b.max.y as f64);
    }
    let Some(area) = clip.cut(
        min_x - reach,
        min_y - MASK_PAD as f64,
        max_x + reach,
        max_y + MASK_PAD as f64,
    ) else {
        return Ok(None);
    };
    let (w, h) = (area.width(), area.height());
    let len = (w as usize)
        .checked_mul(h as usize)
        .ok_or_else(|| LayercutError::render("text mask too large"))?;

    let mut coverage = vec![0.0f32; len];
    for (outline, baseline) in &outlines {
        let b = outline.px_bounds();
        outline.draw(|px, py, cov| {
            let cy = b.min.y + py as f32;
            let mut cx = b.min.x + px as f32;
            if layout.italic {
                cx += (baseline - cy) * ITALIC_SHEAR;
            }
            let ix = cx.round() as i64 - area.x0 as i64;
            let iy = cy.round() as i64 - area.y0 as i64;
            if ix >= 0 && iy >= 0 && ix < w as i64 && iy < h as i64 {
                let slot = &mut coverage[iy as usize * w as usize + ix as usize];
                *slot = slot.max(cov);
            }
        });
    }

    if bold_radius > 0 {
        coverage = dilate_horizontal(&coverage, w as usize, bold_radius as usize);
    }

    let mask = GrayImage::from_fn(w, h, |x, y| {
        let c = coverage[y as usize * w as usize + x as usize];
        Luma([(c.clamp(0.0, 1.0) * 255.0).round() as u8])
    });
    Ok(Some(CoverageMask {
        x: area.x0,
        y: area.y0,
        mask,
    }))
}

/// Max filter along rows; thickens strokes for synthetic bold.
fn dilate_horizontal(src: &[f32], width: usize, radius: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; src.len()];
    for (row_in, row_out) in src.chunks(width).zip(out.chunks_mut(width)) {
        for (x, slot) in row_out.iter_mut().enumerate() {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius + 1).min(width);
            *slot = row_in[lo..hi].iter().copied().fold(0.0, f32::max);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// DejaVu Sans Mono Bold, bundled under `tests/fonts`.
    pub(crate) const TEST_FONT: &[u8] = include_bytes!("../tests/fonts/DejaVuSansMono-Bold.ttf");

    fn test_font() -> FontArc {
        FontArc::try_from_slice(TEST_FONT).unwrap()
    }

    fn open_clip() -> ClipRect {
        ClipRect::canvas(4000, 4000).expand(4000)
    }

    #[test]
    fn test_style_from_file_stem() {
        assert_eq!(style_from_file_stem("Inter-BoldItalic"), ("Inter".into(), 700, true));
        assert_eq!(style_from_file_stem("Arial Black-Black"), ("Arial Black".into(), 900, false));
        assert_eq!(style_from_file_stem("Roboto"), ("Roboto".into(), 400, false));
        assert_eq!(style_from_file_stem("Open Sans-SemiBold"), ("Open Sans".into(), 600, false));
    }

    #[test]
    fn test_empty_book_resolves_nothing() {
        assert!(FontBook::new().resolve("Arial", 400, false).is_none());
    }

    #[test]
    fn test_garbage_font_rejected() {
        let mut book = FontBook::new();
        let err = book
            .register_bytes("Broken", 400, false, vec![0, 1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, LayercutError::InvalidInput { .. }));
        assert!(book.is_empty());
    }

    #[test]
    fn test_resolution_chain() {
        let mut book = FontBook::new();
        book.register_bytes("Body", 400, false, TEST_FONT.to_vec()).unwrap();
        book.register_bytes("Body", 700, false, TEST_FONT.to_vec()).unwrap();
        book.register_bytes("Fallback", 400, false, TEST_FONT.to_vec()).unwrap();

        let r = book.resolve("\"Missing\", Body, sans-serif", 700, false).unwrap();
        assert_eq!(r.family, "Body");
        assert!(!r.synthetic_bold);

        let r = book.resolve("Body", 400, true).unwrap();
        assert!(r.synthetic_italic);

        // Nothing named matches: any registered face.
        assert!(book.resolve("Nope", 400, false).is_some());

        book.set_default_family(Some("Fallback".into()));
        let r = book.resolve("Nope", 900, false).unwrap();
        assert_eq!(r.family, "Fallback");
        assert!(r.synthetic_bold);
    }

    #[test]
    fn test_alignment_moves_the_mask() {
        let font = test_font();
        let layout = |align| TextLayout {
            size: 32.0,
            align,
            anchor_x: 200.0,
            anchor_y: 100.0,
            bold: false,
            italic: false,
        };
        let raster = |align| {
            rasterize_text(&font, "Hello", &layout(align), open_clip())
                .unwrap()
                .unwrap()
        };
        let left = raster(TextAlign::Left);
        let center = raster(TextAlign::Center);
        let right = raster(TextAlign::Right);

        assert!(left.x >= 195);
        assert!(right.x + right.mask.width() as i32 <= 205);
        assert!(center.x < 200 && center.x + center.mask.width() as i32 > 200);
        // Vertically centred on the anchor.
        assert!(center.y < 100 && center.y + center.mask.height() as i32 > 100);
        assert!(center.mask.pixels().any(|p| p.0[0] == 255));
    }

    #[test]
    fn test_multiline_is_taller_and_bold_is_wider() {
        let font = test_font();
        let base = TextLayout {
            size: 24.0,
            align: TextAlign::Left,
            anchor_x: 0.0,
            anchor_y: 0.0,
            bold: false,
            italic: false,
        };
        let raster = |text: &str, layout: &TextLayout| {
            rasterize_text(&font, text, layout, open_clip()).unwrap()
        };
        let one = raster("Line", &base).unwrap();
        let two = raster("Line\nLine", &base).unwrap();
        assert!(two.mask.height() > one.mask.height() + 10);

        let bold = raster("Line", &TextLayout { bold: true, ..base }).unwrap();
        let ink = |m: &CoverageMask| m.mask.pixels().filter(|p| p.0[0] > 128).count();
        assert!(ink(&bold) > ink(&one));

        assert!(raster("   ", &base).is_none());
    }

    #[test]
    fn test_text_mask_is_cut_to_clip() {
        let font = test_font();
        let layout = TextLayout {
            size: 400.0,
            align: TextAlign::Center,
            anchor_x: 50.0,
            anchor_y: 50.0,
            bold: true,
            italic: true,
        };
        let mask = rasterize_text(&font, "MMMM", &layout, ClipRect::canvas(100, 100))
            .unwrap()
            .unwrap();
        assert!(mask.x >= 0 && mask.y >= 0);
        assert!(mask.mask.width() <= 100 && mask.mask.height() <= 100);

        // Entirely off the clip.
        let away = TextLayout {
            anchor_x: 5000.0,
            ..layout
        };
        assert!(rasterize_text(&font, "MMMM", &away, ClipRect::canvas(100, 100))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_oversized_text_is_a_render_error() {
        let font = test_font();
        let layout = TextLayout {
            size: 1e9,
            align: TextAlign::Center,
            anchor_x: 200.0,
            anchor_y: 200.0,
            bold: true,
            italic: false,
        };
        let err = rasterize_text(&font, "Big", &layout, ClipRect::canvas(400, 400)).unwrap_err();
        assert!(matches!(err, LayercutError::Render { .. }));
    }

    #[test]
    fn test_shadow_is_offset_and_spread() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([255]));
        let src = CoverageMask { x: 10, y: 10, mask };
        let clip = ClipRect::canvas(100, 100);

        let hard = src.shadow(3.0, 3.0, 0.0, clip).unwrap().unwrap();
        assert_eq!((hard.x, hard.y), (13, 13));
        assert_eq!(hard.mask.dimensions(), (4, 4));

        let soft = src.shadow(3.0, 3.0, 6.0, clip).unwrap().unwrap();
        assert!(soft.mask.width() > 4);
        let lit = soft.mask.pixels().filter(|p| p.0[0] > 0).count();
        assert!(lit > 1);
    }

    #[test]
    fn test_shadow_is_cut_to_clip() {
        let src = CoverageMask {
            x: 0,
            y: 0,
            mask: GrayImage::from_pixel(10, 10, Luma([255])),
        };
        let clip = ClipRect::canvas(8, 8);

        let near = src.shadow(2.0, 2.0, 4.0, clip).unwrap().unwrap();
        assert_eq!((near.x, near.y), (0, 0));
        assert_eq!(near.mask.dimensions(), (8, 8));

        assert!(src.shadow(500.0, 0.0, 0.0, clip).unwrap().is_none());
    }

    #[test]
    fn test_wide_blur_spreads_and_fades() {
        let src = CoverageMask {
            x: 100,
            y: 100,
            mask: GrayImage::from_pixel(20, 20, Luma([255])),
        };
        let shadow = src
            .shadow(0.0, 0.0, 40.0, ClipRect::canvas(300, 300))
            .unwrap()
            .unwrap();
        let at = |x: i32, y: i32| shadow.mask.get_pixel((x - shadow.x) as u32, (y - shadow.y) as u32).0[0];
        let centre = at(110, 110);
        let beside = at(150, 110);
        assert!(centre > 0);
        assert!(beside < centre / 2, "centre {centre}, beside {beside}");
        assert!(shadow.mask.width() <= 300 && shadow.mask.height() <= 300);
    }

    #[test]
    fn test_max_blur_on_huge_mask_stays_within_clip() {
        let src = CoverageMask {
            x: -3000,
            y: -3000,
            mask: GrayImage::from_pixel(6400, 6400, Luma([255])),
        };
        let clip = ClipRect::canvas(400, 300);
        let started = std::time::Instant::now();
        let shadow = src
            .shadow(0.0, 0.0, MAX_RASTER_BLUR / 8.0, clip)
            .unwrap()
            .unwrap();
        assert_eq!((shadow.x, shadow.y), (0, 0));
        assert_eq!(shadow.mask.dimensions(), (400, 300));
        // Deep inside a solid block the blur changes nothing.
        assert!(shadow.mask.get_pixel(200, 150).0[0] >= 250);
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_shadow_margin_and_translate() {
        assert_eq!(shadow_margin(0.0), 0);
        assert_eq!(shadow_margin(4.0), 7);
        let moved = ClipRect::canvas(10, 10).translate(-5, 3);
        assert_eq!((moved.x0, moved.y0, moved.x1, moved.y1), (-5, 3, 5, 13));
        assert!(check_shadow(MAX_RASTER_OFFSET * 2.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_huge_shadow_blur_is_a_render_error() {
        let src = CoverageMask {
            x: 0,
            y: 0,
            mask: GrayImage::from_pixel(2, 2, Luma([255])),
        };
        let err = src.shadow(0.0, 0.0, 1e12, ClipRect::canvas(8, 8)).unwrap_err();
        assert!(matches!(err, LayercutError::Render { .. }));
        assert!(src.shadow(f32::NAN, 0.0, 1.0, ClipRect::canvas(8, 8)).is_err());
    }
}
