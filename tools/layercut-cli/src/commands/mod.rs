pub mod batch;
pub mod compose;
pub mod info;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use layercut_common::config::AppConfig;
use layercut_document::background::BackgroundSpec;
use layercut_render::{Compositor, ExportStage, FontBook, ProgressCallback};
use layercut_session::{
    CommandGateway, EditorSession, PassthroughGateway, SegmentationGateway, SessionHandle,
};

/// Options shared by every command that produces a composition.
#[derive(clap::Args, Debug, Clone)]
pub struct StyleArgs {
    /// Segmentation command, e.g. "rembg i {input} {output}".
    /// Without it the input must already be a cut-out PNG.
    #[arg(long)]
    pub segment_cmd: Option<String>,

    /// Backdrop: "transparent", a color, or "linear-gradient(...)"
    #[arg(long)]
    pub background: Option<String>,

    /// Backdrop image, scaled to cover the whole frame
    #[arg(long, conflicts_with = "background")]
    pub background_image: Option<PathBuf>,

    /// Extra font file to register (repeatable)
    #[arg(long = "font")]
    pub fonts: Vec<PathBuf>,
}

impl StyleArgs {
    pub fn gateway(&self) -> anyhow::Result<Arc<dyn SegmentationGateway>> {
        Ok(match &self.segment_cmd {
            Some(template) => Arc::new(CommandGateway::from_template(template)?),
            None => Arc::new(PassthroughGateway),
        })
    }

    pub fn background_spec(&self) -> anyhow::Result<Option<BackgroundSpec>> {
        if let Some(path) = &self.background_image {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read background {}", path.display()))?;
            return Ok(Some(BackgroundSpec::Image(bytes)));
        }
        self.background
            .as_deref()
            .map(BackgroundSpec::parse_css)
            .transpose()
            .map_err(Into::into)
    }

    /// Fonts from the config plus any given on the command line.
    pub fn font_book(&self, config: &AppConfig) -> FontBook {
        let mut fonts = FontBook::from_config(&config.fonts);
        for path in &self.fonts {
            if let Err(e) = fonts.register_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Skipping font");
            }
        }
        fonts
    }

    pub fn session(&self, config: &AppConfig) -> anyhow::Result<SessionHandle> {
        let compositor = Compositor::new(self.font_book(config));
        Ok(SessionHandle::new(
            EditorSession::new(config, compositor),
            self.gateway()?,
        ))
    }
}

pub fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn progress_printer() -> ProgressCallback {
    Box::new(|p| {
        if p.stage == ExportStage::Complete {
            println!("\r  Progress: 100% (done)        ");
        } else {
            print!("\r  Progress: {:>3.0}% ({:?})  ", p.progress * 100.0, p.stage);
        }
    })
}
