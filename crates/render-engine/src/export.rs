//! Export: native-resolution composition encoded as PNG.

use std::io::Cursor;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};

use layercut_common::error::{LayercutError, LayercutResult};

use crate::compositor::{Compositor, SceneSnapshot};

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Background,
    Overlays,
    Subject,
    Encoding,
    Complete,
}

/// Result of a finished export.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    /// PNG-encoded bytes.
    pub png: Vec<u8>,
}

impl ExportedImage {
    /// Write the PNG to disk, creating parent directories.
    pub fn write_to(&self, path: &Path) -> LayercutResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.png)?;
        tracing::info!(path = %path.display(), bytes = self.png.len(), "Wrote export");
        Ok(())
    }
}

/// Render `scene` at native resolution and encode it as PNG.
///
/// Independent of any viewport state: the scene carries native geometry only.
pub fn export_png(
    compositor: &Compositor,
    scene: &SceneSnapshot,
    progress: Option<&ProgressCallback>,
) -> LayercutResult<ExportedImage> {
    tracing::info!(
        width = scene.width,
        height = scene.height,
        background = scene.background.kind(),
        overlays = scene.overlays.len(),
        strokes = scene.strokes.len(),
        "Starting export"
    );
    let started = std::time::Instant::now();

    if let Some(cb) = progress {
        cb(ExportProgress {
            progress: 0.0,
            stage: ExportStage::Preparing,
        });
    }

    let raster = compositor.compose_with_progress(scene, 1.0, progress)?;
    if raster.dimensions() != (scene.width, scene.height) {
        return Err(LayercutError::render(format!(
            "composed {}x{} for a {}x{} document",
            raster.width(),
            raster.height(),
            scene.width,
            scene.height
        )));
    }

    if let Some(cb) = progress {
        cb(ExportProgress {
            progress: 0.9,
            stage: ExportStage::Encoding,
        });
    }
    let png = encode_png(&raster)?;

    if let Some(cb) = progress {
        cb(ExportProgress {
            progress: 1.0,
            stage: ExportStage::Complete,
        });
    }
    tracing::info!(
        bytes = png.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Export complete"
    );

    Ok(ExportedImage {
        width: raster.width(),
        height: raster.height(),
        png,
    })
}

/// Encode an RGBA raster as PNG.
pub fn encode_png(image: &RgbaImage) -> LayercutResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(buf.into_inner())
}
