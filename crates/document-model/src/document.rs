//! The layer store: canonical native-resolution state of one document.
//!
//! Holds the subject raster, the background and the overlay stack. Erase
//! strokes live in the mask engine, which reads the subject from here.
//! Every successful mutation raises a render-dirty flag; nothing else
//! happens as a side effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use layercut_common::config::OverlayDefaults;
use layercut_common::error::{LayercutError, LayercutResult};

use crate::background::{BackgroundLayer, BackgroundSpec};
use crate::overlay::{OverlayId, OverlayItem, OverlayStack, TextStyle, TextStylePatch};
use crate::viewport::Point2D;

/// Largest subject edge, in pixels. Anything that loads can be exported at
/// native size.
pub const MAX_DIMENSION: u32 = 32_768;

/// Document metadata, fixed at subject load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Native width in pixels.
    pub width: u32,
    /// Native height in pixels.
    pub height: u32,
    pub created_at: DateTime<Utc>,
    /// Name of the gateway that produced the subject.
    pub source: String,
}

impl Document {
    fn new(width: u32, height: u32, source: &str) -> Self {
        Self {
            width,
            height,
            created_at: Utc::now(),
            source: source.to_string(),
        }
    }

    /// Native centre point.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

/// Background, subject and overlays of the active document.
#[derive(Debug)]
pub struct LayerStore {
    document: Option<Document>,
    subject: Option<Arc<RgbaImage>>,
    background: BackgroundLayer,
    overlays: OverlayStack,
    overlay_defaults: OverlayDefaults,
    dirty: bool,
}

impl LayerStore {
    pub fn new(overlay_defaults: OverlayDefaults) -> Self {
        Self {
            document: None,
            subject: None,
            background: BackgroundLayer::Transparent,
            overlays: OverlayStack::new(),
            overlay_defaults,
            dirty: false,
        }
    }

    /// Load a raw RGBA subject. `rgba.len()` must equal `width * height * 4`.
    pub fn load_subject(&mut self, rgba: Vec<u8>, width: u32, height: u32) -> LayercutResult<&Document> {
        if width == 0 || height == 0 {
            return Err(LayercutError::decode(format!(
                "subject has zero size ({width}x{height})"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| LayercutError::decode("subject dimensions overflow"))?;
        if rgba.len() != expected {
            return Err(LayercutError::decode(format!(
                "subject payload is {} bytes, expected {expected} for {width}x{height} RGBA",
                rgba.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| LayercutError::decode("subject payload does not fit its dimensions"))?;
        self.load_subject_image(image, "raw")
    }

    /// Decode PNG/JPEG bytes and load them as the subject.
    pub fn load_subject_encoded(&mut self, bytes: &[u8], source: &str) -> LayercutResult<&Document> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| LayercutError::decode(format!("subject image: {e}")))?;
        self.load_subject_image(decoded.to_rgba8(), source)
    }

    /// Load an already decoded subject.
    ///
    /// Rejected while a subject is present; call [`LayerStore::clear`] first.
    pub fn load_subject_image(&mut self, image: RgbaImage, source: &str) -> LayercutResult<&Document> {
        if self.subject.is_some() {
            return Err(LayercutError::invalid_state(
                "a subject is already loaded; clear the store first",
            ));
        }
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(LayercutError::decode("subject has zero size"));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(LayercutError::decode(format!(
                "subject of {width}x{height} exceeds {MAX_DIMENSION}px per edge"
            )));
        }

        self.subject = Some(Arc::new(image));
        self.dirty = true;
        tracing::info!(width, height, source, "Subject loaded");
        Ok(self.document.insert(Document::new(width, height, source)))
    }

    /// Forget the subject, background and overlays.
    pub fn clear(&mut self) {
        self.document = None;
        self.subject = None;
        self.background = BackgroundLayer::Transparent;
        self.overlays.clear();
        self.dirty = true;
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn subject(&self) -> Option<&Arc<RgbaImage>> {
        self.subject.as_ref()
    }

    pub fn has_subject(&self) -> bool {
        self.subject.is_some()
    }

    /// Replace the background. A malformed spec leaves the old one in place.
    pub fn set_background(&mut self, spec: &BackgroundSpec) -> LayercutResult<()> {
        let layer = BackgroundLayer::resolve(spec)?;
        tracing::debug!(kind = layer.kind(), "Background set");
        self.background = layer;
        self.dirty = true;
        Ok(())
    }

    pub fn background(&self) -> &BackgroundLayer {
        &self.background
    }

    /// Add a text item on top of the overlay stack, centred on the document.
    ///
    /// `None` uses the configured placeholder style.
    pub fn add_overlay_text(&mut self, style: Option<TextStyle>) -> LayercutResult<OverlayId> {
        let document = self.require_document()?;
        let center = document.center();
        let style =
            style.unwrap_or_else(|| TextStyle::default_for(document.width, &self.overlay_defaults));
        let id = self.overlays.push(center, style)?;
        self.dirty = true;
        tracing::debug!(id, "Overlay text added");
        Ok(id)
    }

    pub fn update_overlay_text(
        &mut self,
        id: OverlayId,
        patch: TextStylePatch,
    ) -> LayercutResult<&OverlayItem> {
        self.require_document()?;
        let item = self.overlays.update(id, patch)?;
        self.dirty = true;
        Ok(item)
    }

    pub fn move_overlay_text(&mut self, id: OverlayId, position: Point2D) -> LayercutResult<&OverlayItem> {
        self.require_document()?;
        let item = self.overlays.move_to(id, position)?;
        self.dirty = true;
        Ok(item)
    }

    pub fn remove_overlay_text(&mut self, id: OverlayId) -> LayercutResult<OverlayItem> {
        self.require_document()?;
        let removed = self.overlays.remove(id)?;
        self.dirty = true;
        tracing::debug!(id, "Overlay text removed");
        Ok(removed)
    }

    pub fn overlay_text(&self, id: OverlayId) -> LayercutResult<&OverlayItem> {
        self.require_document()?;
        self.overlays.get(id)
    }

    /// Overlay items in paint order (bottom first).
    pub fn overlays(&self) -> &[OverlayItem] {
        self.overlays.items()
    }

    /// Flag a re-render for changes made outside the store (e.g. strokes).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read and reset the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn require_document(&self) -> LayercutResult<&Document> {
        self.document.as_ref().ok_or(LayercutError::NoSubject)
    }
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new(OverlayDefaults::default())
    }
}
