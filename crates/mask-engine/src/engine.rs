//! The mask engine: turns display-space pointer gestures into native-space
//! erase strokes and renders the masked subject at any scale.

use std::sync::Arc;

use image::RgbaImage;

use layercut_common::error::{LayercutError, LayercutResult};
use layercut_document::document::LayerStore;
use layercut_document::viewport::{Point2D, ViewportTransform};

use crate::history::EraseHistory;
use crate::render::render_masked;
use crate::stroke::{stroke_from_points, MaskStroke, StrokeBuilder};

/// Stroke capture state plus the committed erase history.
#[derive(Debug, Default)]
pub struct MaskEngine {
    history: EraseHistory,
    active: Option<StrokeBuilder>,
}

impl MaskEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stroke at a display-space point.
    ///
    /// Point and brush width are converted to native units here, once, with
    /// the transform current at the start of the gesture.
    pub fn begin_stroke(
        &mut self,
        layers: &LayerStore,
        transform: &ViewportTransform,
        display_point: Point2D,
        display_width: f64,
    ) -> LayercutResult<()> {
        if !layers.has_subject() {
            return Err(LayercutError::NoSubject);
        }
        if self.active.is_some() {
            return Err(LayercutError::invalid_state("a stroke is already in progress"));
        }
        if !(display_width.is_finite() && display_width > 0.0) {
            return Err(LayercutError::invalid_input(format!(
                "brush width must be positive (got {display_width})"
            )));
        }
        let native_point = transform.to_native(display_point);
        let native_width = transform.native_length(display_width);
        self.active = Some(StrokeBuilder::new(native_point, native_width)?);
        tracing::trace!(
            x = native_point.x,
            y = native_point.y,
            width = native_width,
            "Stroke started"
        );
        Ok(())
    }

    /// Add a display-space sample to the open stroke.
    ///
    /// Returns `false` when the sample repeated the previous one.
    pub fn extend_stroke(
        &mut self,
        transform: &ViewportTransform,
        display_point: Point2D,
    ) -> LayercutResult<bool> {
        let builder = self
            .active
            .as_mut()
            .ok_or_else(|| LayercutError::invalid_state("no stroke in progress"))?;
        builder.push(transform.to_native(display_point))
    }

    /// Commit the open stroke. No-op (`None`) when nothing is open.
    pub fn end_stroke(&mut self) -> Option<Arc<MaskStroke>> {
        let stroke = self.active.take()?.finish()?;
        tracing::debug!(
            samples = stroke.samples().len(),
            width = stroke.width(),
            "Stroke committed"
        );
        Some(self.history.push(stroke))
    }

    /// Drop the open stroke without touching the history.
    pub fn cancel_stroke(&mut self) -> bool {
        self.active.take().is_some()
    }

    /// Commit a stroke given directly in native coordinates.
    pub fn import_stroke(&mut self, points: &[Point2D], width: f64) -> LayercutResult<Arc<MaskStroke>> {
        if self.active.is_some() {
            return Err(LayercutError::invalid_state("a stroke is already in progress"));
        }
        let stroke = stroke_from_points(points, width)?;
        Ok(self.history.push(stroke))
    }

    /// Undo the newest stroke. `false` if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.history.undo().is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo().is_some()
    }

    /// Forget every stroke, including the open one and the redo buffer.
    pub fn reset_all(&mut self) {
        self.active = None;
        self.history.clear();
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn history(&self) -> &EraseHistory {
        &self.history
    }

    /// The stroke being drawn, as it would be committed right now.
    pub fn open_stroke(&self) -> Option<MaskStroke> {
        self.active.as_ref().map(StrokeBuilder::preview)
    }

    /// The subject at `target_scale` with every committed stroke erased.
    pub fn render_masked_subject(
        &self,
        layers: &LayerStore,
        target_scale: f64,
    ) -> LayercutResult<RgbaImage> {
        let subject = layers.subject().ok_or(LayercutError::NoSubject)?;
        render_masked(
            subject,
            self.history.strokes().iter().map(|s| s.as_ref()),
            target_scale,
        )
    }

    /// Like [`MaskEngine::render_masked_subject`] but includes the open
    /// stroke, for live display while drawing.
    pub fn render_preview(&self, layers: &LayerStore, target_scale: f64) -> LayercutResult<RgbaImage> {
        let subject = layers.subject().ok_or(LayercutError::NoSubject)?;
        let open = self.open_stroke();
        render_masked(
            subject,
            self.history
                .strokes()
                .iter()
                .map(|s| s.as_ref())
                .chain(open.as_ref()),
            target_scale,
        )
    }
}
