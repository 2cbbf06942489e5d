//! Layer compositing.
//!
//! Flattens a scene bottom-up: background, overlay text in insertion order,
//! then the masked subject. The same code path serves the on-screen preview
//! (`scale` = viewport scale) and export (`scale` = 1.0).

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use layercut_common::error::{LayercutError, LayercutResult};
use layercut_document::background::{BackgroundLayer, LinearGradient};
use layercut_document::color::parse_color;
use layercut_document::document::LayerStore;
use layercut_document::overlay::{FontStyle, OverlayItem};
use layercut_mask::render::{render_masked, scaled_size};
use layercut_mask::{MaskEngine, MaskStroke};

use crate::export::{ExportProgress, ExportStage, ProgressCallback};
use crate::text::{
    check_shadow, rasterize_text, shadow_margin, ClipRect, CoverageMask, FontBook, TextLayout,
};

/// Immutable copy of everything a render reads.
///
/// Built under the session lock, rendered after it is released. The open
/// stroke is never part of a snapshot.
#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    pub width: u32,
    pub height: u32,
    pub subject: Arc<RgbaImage>,
    pub background: BackgroundLayer,
    pub overlays: Vec<OverlayItem>,
    pub strokes: Vec<Arc<MaskStroke>>,
}

impl SceneSnapshot {
    pub fn capture(layers: &LayerStore, mask: &MaskEngine) -> LayercutResult<Self> {
        let document = layers.document().ok_or(LayercutError::NoSubject)?;
        let subject = layers.subject().ok_or(LayercutError::NoSubject)?;
        Ok(Self {
            width: document.width,
            height: document.height,
            subject: Arc::clone(subject),
            background: layers.background().clone(),
            overlays: layers.overlays().to_vec(),
            strokes: mask.history().snapshot(),
        })
    }
}

/// Renders scenes with a fixed set of fonts.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    fonts: FontBook,
}

impl Compositor {
    pub fn new(fonts: FontBook) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    /// Flatten `scene` at `scale` (1.0 = native resolution).
    pub fn compose(&self, scene: &SceneSnapshot, scale: f64) -> LayercutResult<RgbaImage> {
        self.compose_with_progress(scene, scale, None)
    }

    pub fn compose_with_progress(
        &self,
        scene: &SceneSnapshot,
        scale: f64,
        progress: Option<&ProgressCallback>,
    ) -> LayercutResult<RgbaImage> {
        let report = |stage: ExportStage, fraction: f64| {
            if let Some(cb) = progress {
                cb(ExportProgress {
                    progress: fraction,
                    stage,
                });
            }
        };

        let (width, height) = scaled_size(scene.width, scene.height, scale)?;
        report(ExportStage::Background, 0.1);
        let mut canvas = RgbaImage::new(width, height);
        fill_background(&mut canvas, &scene.background);

        report(ExportStage::Overlays, 0.3);
        self.paint_overlays(&mut canvas, &scene.overlays, scale)?;

        report(ExportStage::Subject, 0.6);
        let subject = render_masked(
            &scene.subject,
            scene.strokes.iter().map(|s| s.as_ref()),
            scale,
        )?;
        source_over(&mut canvas, &subject, 0, 0);

        tracing::debug!(
            width,
            height,
            scale,
            overlays = scene.overlays.len(),
            strokes = scene.strokes.len(),
            "Scene composed"
        );
        Ok(canvas)
    }

    fn paint_overlays(
        &self,
        canvas: &mut RgbaImage,
        overlays: &[OverlayItem],
        scale: f64,
    ) -> LayercutResult<()> {
        if overlays.is_empty() {
            return Ok(());
        }
        if self.fonts.is_empty() {
            tracing::warn!(
                count = overlays.len(),
                "No fonts registered; overlay text skipped"
            );
            return Ok(());
        }

        let canvas_clip = ClipRect::canvas(canvas.width(), canvas.height());
        for item in overlays {
            let style = &item.style;
            let italic = style.font_style == FontStyle::Italic;
            let Some(face) = self.fonts.resolve(&style.font_family, style.font_weight, italic) else {
                continue;
            };
            let layout = TextLayout {
                size: (style.font_size * scale) as f32,
                align: style.align,
                anchor_x: (item.position.x * scale) as f32,
                anchor_y: (item.position.y * scale) as f32,
                bold: face.synthetic_bold,
                italic: face.synthetic_italic,
            };
            let shadow = style
                .shadow
                .as_ref()
                .and_then(|shadow| parse_color(&shadow.color).map(|color| (shadow, color)));
            if let Some((shadow, color)) = shadow {
                let offset_x = (shadow.offset_x * scale) as f32;
                let offset_y = (shadow.offset_y * scale) as f32;
                let blur = (shadow.blur * scale) as f32;
                check_shadow(offset_x, offset_y, blur)?;
                // Only text within the blur reach of the canvas, shifted back
                // by the offset, can cast onto it.
                let source_clip = canvas_clip
                    .translate(-(offset_x.round() as i32), -(offset_y.round() as i32))
                    .expand(shadow_margin(blur));
                if let Some(source) =
                    rasterize_text(face.font, &style.content, &layout, source_clip)?
                {
                    if let Some(shadow_mask) = source.shadow(offset_x, offset_y, blur, canvas_clip)? {
                        paint_mask(canvas, &shadow_mask, color);
                    }
                }
            }

            let Some(mask) = rasterize_text(face.font, &style.content, &layout, canvas_clip)? else {
                continue;
            };
            match parse_color(&style.color) {
                Some(color) => paint_mask(canvas, &mask, color),
                None => tracing::warn!(id = item.id, color = %style.color, "Unparsable text color"),
            }
        }
        Ok(())
    }
}

/// Fill the whole canvas with a background layer.
pub fn fill_background(canvas: &mut RgbaImage, background: &BackgroundLayer) {
    match background {
        BackgroundLayer::Transparent => {
            for p in canvas.pixels_mut() {
                *p = Rgba([0, 0, 0, 0]);
            }
        }
        BackgroundLayer::Color(color) => {
            for p in canvas.pixels_mut() {
                *p = *color;
            }
        }
        BackgroundLayer::Gradient(gradient) => fill_gradient(canvas, gradient),
        BackgroundLayer::Image(image) => {
            let cover = cover_fit(image, canvas.width(), canvas.height());
            imageops::replace(canvas, &cover, 0, 0);
        }
    }
}

fn fill_gradient(canvas: &mut RgbaImage, gradient: &LinearGradient) {
    let (w, h) = (canvas.width() as f64, canvas.height() as f64);
    let (start, end) = gradient.endpoints(w, h);
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let len_sq = dx * dx + dy * dy;
    for (x, y, p) in canvas.enumerate_pixels_mut() {
        let t = if len_sq <= f64::EPSILON {
            0.0
        } else {
            ((x as f64 + 0.5 - start.x) * dx + (y as f64 + 0.5 - start.y) * dy) / len_sq
        };
        *p = gradient.color_at(t);
    }
}

/// Scale `image` to cover `width` x `height`, cropping the overflow evenly.
pub fn cover_fit(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (iw, ih) = image.dimensions();
    if (iw, ih) == (width, height) {
        return image.clone();
    }
    let scale = (width as f64 / iw as f64).max(height as f64 / ih as f64);
    let rw = ((iw as f64 * scale).round() as u32).max(width);
    let rh = ((ih as f64 * scale).round() as u32).max(height);
    let resized = imageops::resize(image, rw, rh, FilterType::Triangle);
    imageops::crop_imm(&resized, (rw - width) / 2, (rh - height) / 2, width, height).to_image()
}

/// Blend one straight-alpha pixel over another.
///
/// A fully transparent destination takes the source bytes verbatim, hidden
/// color included. Opaque and fully transparent sources are also exact.
pub fn blend_pixel(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3];
    let da = dst.0[3];
    if da == 0 || sa == 255 {
        *dst = src;
        return;
    }
    if sa == 0 {
        return;
    }
    let sa_f = sa as f32 / 255.0;
    let da_f = da as f32 / 255.0;
    let out_a = sa_f + da_f * (1.0 - sa_f);
    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (src.0[i] as f32 * sa_f + dst.0[i] as f32 * da_f * (1.0 - sa_f)) / out_a;
        out[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    *dst = Rgba(out);
}

/// Source-over composite `src` onto `dst` with its top-left at `(x, y)`.
pub fn source_over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    for (sx, sy, p) in src.enumerate_pixels() {
        let (tx, ty) = (x + sx as i64, y + sy as i64);
        if tx < 0 || ty < 0 || tx >= dw || ty >= dh {
            continue;
        }
        blend_pixel(dst.get_pixel_mut(tx as u32, ty as u32), *p);
    }
}

/// Paint `color` through a coverage mask.
pub fn paint_mask(canvas: &mut RgbaImage, mask: &CoverageMask, color: Rgba<u8>) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    for (mx, my, cov) in mask.mask.enumerate_pixels() {
        let coverage = cov.0[0];
        if coverage == 0 {
            continue;
        }
        let (tx, ty) = (mask.x as i64 + mx as i64, mask.y as i64 + my as i64);
        if tx < 0 || ty < 0 || tx >= cw || ty >= ch {
            continue;
        }
        let alpha = (color.0[3] as u32 * coverage as u32 + 127) / 255;
        let src = Rgba([color.0[0], color.0[1], color.0[2], alpha as u8]);
        blend_pixel(canvas.get_pixel_mut(tx as u32, ty as u32), src);
    }
}
