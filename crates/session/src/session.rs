//! Editing session management.
//!
//! [`EditorSession`] owns the single active document and its state machine:
//!
//! ```text
//! Empty ──upload──► Loading ──ok──► Ready ◄──► Exporting
//!                     │  ▲
//!                   error│retry
//!                     ▼  │
//!                    Failed
//! ```
//!
//! A new upload from any state clears the document and re-enters `Loading`.
//! Every upload bumps a generation counter; a segmentation result carrying
//! an older generation is discarded without touching the session.

use std::sync::Arc;

use image::RgbaImage;

use layercut_common::config::AppConfig;
use layercut_common::error::{LayercutError, LayercutResult};
use layercut_common::throttle::RenderThrottle;
use layercut_document::background::BackgroundSpec;
use layercut_document::document::{Document, LayerStore};
use layercut_document::overlay::{OverlayId, OverlayItem, TextStyle, TextStylePatch};
use layercut_document::viewport::{Point2D, Subscription, ViewportController, ViewportTransform};
use layercut_mask::{MaskEngine, MaskStroke};
use layercut_render::{Compositor, SceneSnapshot};

/// State of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No upload yet.
    Empty,
    /// Segmentation in flight.
    Loading,
    /// Subject loaded, document editable.
    Ready,
    /// An export snapshot is being rendered.
    Exporting,
    /// The last load failed; `retry` re-runs it.
    Failed,
}

/// Handed out when a load starts; must accompany its result.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    bytes: Arc<Vec<u8>>,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The uploaded image bytes to send to the gateway.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// What happened to a completed load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The result became the active document.
    Applied(Document),
    /// A newer upload superseded this one; the result was dropped.
    Stale,
}

/// Handed out when an export starts.
#[derive(Debug, Clone, Copy)]
pub struct ExportTicket {
    generation: u64,
}

/// The single active document plus everything needed to edit and render it.
pub struct EditorSession {
    state: SessionState,
    generation: u64,
    upload: Option<Arc<Vec<u8>>>,
    last_error: Option<String>,
    layers: LayerStore,
    mask: MaskEngine,
    viewport: ViewportController,
    throttle: RenderThrottle,
    compositor: Arc<Compositor>,
}

impl EditorSession {
    pub fn new(config: &AppConfig, compositor: Compositor) -> Self {
        Self {
            state: SessionState::Empty,
            generation: 0,
            upload: None,
            last_error: None,
            layers: LayerStore::new(config.overlay.clone()),
            mask: MaskEngine::new(),
            viewport: ViewportController::new(&config.viewport),
            throttle: RenderThrottle::new(config.export.preview_fps),
            compositor: Arc::new(compositor),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Message of the failure that put the session into `Failed`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.layers.document()
    }

    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    pub fn mask(&self) -> &MaskEngine {
        &self.mask
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    // --- Loading -------------------------------------------------------

    /// Start a new upload. Clears the current document from any state.
    pub fn begin_load(&mut self, bytes: Vec<u8>) -> LoadTicket {
        self.layers.clear();
        self.mask.reset_all();
        self.viewport.detach();
        self.last_error = None;
        let bytes = Arc::new(bytes);
        self.upload = Some(Arc::clone(&bytes));
        self.start_generation(bytes)
    }

    /// Re-run the last failed upload.
    pub fn retry(&mut self) -> LayercutResult<LoadTicket> {
        if self.state != SessionState::Failed {
            return Err(LayercutError::invalid_state(format!(
                "retry is only possible after a failed load (state {:?})",
                self.state
            )));
        }
        let bytes = self
            .upload
            .clone()
            .ok_or_else(|| LayercutError::invalid_state("no upload to retry"))?;
        self.last_error = None;
        Ok(self.start_generation(bytes))
    }

    fn start_generation(&mut self, bytes: Arc<Vec<u8>>) -> LoadTicket {
        self.generation += 1;
        self.state = SessionState::Loading;
        self.throttle.invalidate();
        tracing::info!(generation = self.generation, bytes = bytes.len(), "Load started");
        LoadTicket {
            generation: self.generation,
            bytes,
        }
    }

    /// Apply a gateway result.
    ///
    /// Stale tickets are a silent no-op. Errors move the session to
    /// `Failed` and are returned to the caller.
    pub fn complete_load(
        &mut self,
        ticket: &LoadTicket,
        result: LayercutResult<RgbaImage>,
        source: &str,
    ) -> LayercutResult<LoadOutcome> {
        if ticket.generation != self.generation || self.state != SessionState::Loading {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale segmentation result"
            );
            return Ok(LoadOutcome::Stale);
        }

        let loaded = result.and_then(|subject| {
            self.layers.load_subject_image(subject, source).cloned()
        });
        match loaded {
            Ok(document) => {
                self.viewport.attach(document.width, document.height);
                self.state = SessionState::Ready;
                self.throttle.invalidate();
                Ok(LoadOutcome::Applied(document))
            }
            Err(e) => {
                tracing::warn!(generation = self.generation, error = %e, "Load failed");
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // --- Viewport ------------------------------------------------------

    pub fn subscribe_viewport<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&ViewportTransform) + Send + 'static,
    {
        self.viewport.subscribe(callback)
    }

    pub fn unsubscribe_viewport(&mut self, ticket: Subscription) -> bool {
        self.viewport.unsubscribe(ticket)
    }

    pub fn fit_to_container(&mut self, width: f64, height: f64) -> LayercutResult<ViewportTransform> {
        let t = self.viewport.fit_to_container(width, height)?;
        self.throttle.invalidate();
        Ok(t)
    }

    pub fn zoom(&mut self, delta: f64, anchor: Point2D) -> LayercutResult<ViewportTransform> {
        let t = self.viewport.zoom(delta, anchor)?;
        self.throttle.invalidate();
        Ok(t)
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> LayercutResult<ViewportTransform> {
        let t = self.viewport.pan(dx, dy)?;
        self.throttle.invalidate();
        Ok(t)
    }

    pub fn reset_view(&mut self) -> LayercutResult<ViewportTransform> {
        let t = self.viewport.reset()?;
        self.throttle.invalidate();
        Ok(t)
    }

    // --- Layers --------------------------------------------------------

    pub fn set_background(&mut self, spec: &BackgroundSpec) -> LayercutResult<()> {
        self.layers.set_background(spec)?;
        self.throttle.invalidate();
        Ok(())
    }

    pub fn add_overlay_text(&mut self, style: Option<TextStyle>) -> LayercutResult<OverlayId> {
        let id = self.layers.add_overlay_text(style)?;
        self.throttle.invalidate();
        Ok(id)
    }

    pub fn update_overlay_text(&mut self, id: OverlayId, patch: TextStylePatch) -> LayercutResult<OverlayItem> {
        let item = self.layers.update_overlay_text(id, patch)?.clone();
        self.throttle.invalidate();
        Ok(item)
    }

    pub fn move_overlay_text(&mut self, id: OverlayId, position: Point2D) -> LayercutResult<OverlayItem> {
        let item = self.layers.move_overlay_text(id, position)?.clone();
        self.throttle.invalidate();
        Ok(item)
    }

    pub fn remove_overlay_text(&mut self, id: OverlayId) -> LayercutResult<OverlayItem> {
        let item = self.layers.remove_overlay_text(id)?;
        self.throttle.invalidate();
        Ok(item)
    }

    pub fn overlay_text(&self, id: OverlayId) -> LayercutResult<&OverlayItem> {
        self.layers.overlay_text(id)
    }

    // --- Strokes -------------------------------------------------------

    /// Start erasing at a display-space point with a display-space brush.
    pub fn begin_stroke(&mut self, display_point: Point2D, display_width: f64) -> LayercutResult<()> {
        let transform = self.viewport.transform();
        self.mask
            .begin_stroke(&self.layers, &transform, display_point, display_width)?;
        self.throttle.invalidate();
        Ok(())
    }

    pub fn extend_stroke(&mut self, display_point: Point2D) -> LayercutResult<()> {
        let transform = self.viewport.transform();
        if self.mask.extend_stroke(&transform, display_point)? {
            self.throttle.invalidate();
        }
        Ok(())
    }

    pub fn end_stroke(&mut self) -> Option<Arc<MaskStroke>> {
        let stroke = self.mask.end_stroke()?;
        self.mark_changed();
        Some(stroke)
    }

    pub fn cancel_stroke(&mut self) -> bool {
        let cancelled = self.mask.cancel_stroke();
        if cancelled {
            self.throttle.invalidate();
        }
        cancelled
    }

    /// Commit a stroke given in native coordinates.
    pub fn import_stroke(&mut self, points: &[Point2D], width: f64) -> LayercutResult<Arc<MaskStroke>> {
        if !self.layers.has_subject() {
            return Err(LayercutError::NoSubject);
        }
        let stroke = self.mask.import_stroke(points, width)?;
        self.mark_changed();
        Ok(stroke)
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.mask.undo();
        if undone {
            self.mark_changed();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.mask.redo();
        if redone {
            self.mark_changed();
        }
        redone
    }

    pub fn reset_all(&mut self) {
        self.mask.reset_all();
        self.mark_changed();
    }

    fn mark_changed(&mut self) {
        self.layers.mark_dirty();
        self.throttle.invalidate();
    }

    // --- Rendering -----------------------------------------------------

    /// Whether a preview repaint is due at `now_ns` (monotonic).
    pub fn poll_render(&mut self, now_ns: u64) -> bool {
        self.throttle.poll(now_ns)
    }

    /// Composite at the current viewport scale, including the open stroke.
    pub fn render_preview(&self) -> LayercutResult<RgbaImage> {
        let mut scene = SceneSnapshot::capture(&self.layers, &self.mask)?;
        if let Some(open) = self.mask.open_stroke() {
            scene.strokes.push(Arc::new(open));
        }
        self.compositor.compose(&scene, self.viewport.transform().scale)
    }

    /// Freeze the document for export and enter `Exporting`.
    ///
    /// Edits stay possible while exporting; they do not affect the
    /// snapshot already taken.
    pub fn begin_export(&mut self) -> LayercutResult<(ExportTicket, SceneSnapshot)> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Exporting => {
                return Err(LayercutError::invalid_state("an export is already running"));
            }
            _ => return Err(LayercutError::NoSubject),
        }
        let scene = SceneSnapshot::capture(&self.layers, &self.mask)?;
        self.state = SessionState::Exporting;
        Ok((
            ExportTicket {
                generation: self.generation,
            },
            scene,
        ))
    }

    /// Leave `Exporting`. A no-op if a new upload started meanwhile.
    pub fn finish_export(&mut self, ticket: ExportTicket) {
        if ticket.generation == self.generation && self.state == SessionState::Exporting {
            self.state = SessionState::Ready;
        }
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("document", &self.layers.document())
            .field("strokes", &self.mask.history().len())
            .field("overlays", &self.layers.overlays().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn session() -> EditorSession {
        EditorSession::new(&AppConfig::default(), Compositor::default())
    }

    fn subject(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255]))
    }

    fn ready(w: u32, h: u32) -> EditorSession {
        let mut s = session();
        let ticket = s.begin_load(vec![1]);
        s.complete_load(&ticket, Ok(subject(w, h)), "test").unwrap();
        s
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Empty);
        let ticket = s.begin_load(vec![1, 2, 3]);
        assert_eq!(s.state(), SessionState::Loading);
        assert_eq!(ticket.bytes(), &[1, 2, 3]);

        let outcome = s.complete_load(&ticket, Ok(subject(40, 30)), "test").unwrap();
        assert!(matches!(outcome, LoadOutcome::Applied(ref d) if d.width == 40 && d.height == 30));
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.viewport().native_size(), Some((40, 30)));
    }

    #[test]
    fn test_stale_result_is_ignored() {
        let mut s = session();
        let first = s.begin_load(vec![1]);
        let second = s.begin_load(vec![2]);
        assert!(second.generation() > first.generation());

        let outcome = s.complete_load(&first, Ok(subject(8, 8)), "test").unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(s.state(), SessionState::Loading);
        assert!(s.document().is_none());

        // A stale failure is swallowed too.
        let late = s.complete_load(&first, Err(LayercutError::segmentation("boom")), "test");
        assert!(matches!(late, Ok(LoadOutcome::Stale)));

        s.complete_load(&second, Ok(subject(4, 4)), "test").unwrap();
        assert_eq!(s.document().map(|d| d.width), Some(4));
    }

    #[test]
    fn test_failure_then_retry() {
        let mut s = session();
        let ticket = s.begin_load(vec![9]);
        let err = s
            .complete_load(&ticket, Err(LayercutError::segmentation("model down")), "test")
            .unwrap_err();
        assert!(err.is_load_failure());
        assert_eq!(s.state(), SessionState::Failed);
        assert!(s.last_error().unwrap().contains("model down"));

        let retry = s.retry().unwrap();
        assert_eq!(retry.bytes(), &[9]);
        assert_eq!(s.state(), SessionState::Loading);
        s.complete_load(&retry, Ok(subject(2, 2)), "test").unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(s.last_error().is_none());
    }

    #[test]
    fn test_retry_only_after_failure() {
        let mut s = ready(2, 2);
        assert!(matches!(s.retry(), Err(LayercutError::InvalidState { .. })));
    }

    #[test]
    fn test_new_upload_clears_document() {
        let mut s = ready(10, 10);
        s.add_overlay_text(None).unwrap();
        s.import_stroke(&[Point2D::new(1.0, 1.0)], 2.0).unwrap();
        s.begin_load(vec![5]);
        assert!(s.document().is_none());
        assert!(s.layers().overlays().is_empty());
        assert!(s.mask().history().is_empty());
        assert!(matches!(s.add_overlay_text(None), Err(LayercutError::NoSubject)));
    }

    #[test]
    fn test_export_state_rules() {
        let mut empty = session();
        assert!(matches!(empty.begin_export(), Err(LayercutError::NoSubject)));

        let mut s = ready(6, 6);
        let (ticket, scene) = s.begin_export().unwrap();
        assert_eq!(s.state(), SessionState::Exporting);
        assert!(matches!(s.begin_export(), Err(LayercutError::InvalidState { .. })));

        // Edits during export do not reach the snapshot.
        s.import_stroke(&[Point2D::new(3.0, 3.0)], 2.0).unwrap();
        assert!(scene.strokes.is_empty());

        s.finish_export(ticket);
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn test_finish_export_after_new_upload_keeps_loading() {
        let mut s = ready(6, 6);
        let (ticket, _) = s.begin_export().unwrap();
        s.begin_load(vec![3]);
        s.finish_export(ticket);
        assert_eq!(s.state(), SessionState::Loading);
    }

    #[test]
    fn test_display_strokes_use_current_viewport() {
        let mut s = ready(100, 100);
        s.fit_to_container(50.0, 50.0).unwrap();
        s.begin_stroke(Point2D::new(25.0, 25.0), 5.0).unwrap();
        s.extend_stroke(Point2D::new(30.0, 25.0)).unwrap();
        let stroke = s.end_stroke().unwrap();
        assert_eq!(stroke.samples()[0], Point2D::new(50.0, 50.0));
        assert_eq!(stroke.samples()[1], Point2D::new(60.0, 50.0));
        assert_eq!(stroke.width(), 10.0);
    }

    #[test]
    fn test_preview_renders_at_viewport_scale() {
        let mut s = ready(100, 80);
        s.fit_to_container(50.0, 50.0).unwrap();
        let preview = s.render_preview().unwrap();
        assert_eq!(preview.dimensions(), (50, 40));
    }

    #[test]
    fn test_render_throttle_coalesces_edits() {
        let mut s = ready(10, 10);
        assert!(s.poll_render(0));
        s.zoom(0.5, Point2D::new(0.0, 0.0)).unwrap();
        s.pan(3.0, 3.0).unwrap();
        assert!(!s.poll_render(1_000_000));
        assert!(s.poll_render(20_000_000));
        assert!(!s.poll_render(40_000_000));
    }

    #[test]
    fn test_viewport_subscribers_follow_session() {
        use std::sync::{Arc, Mutex};

        let mut s = ready(200, 100);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ticket = s.subscribe_viewport(move |t| sink.lock().unwrap().push(t.scale));
        s.fit_to_container(100.0, 100.0).unwrap();
        assert!(s.unsubscribe_viewport(ticket));
        s.reset_view().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 0.5]);
    }
}
