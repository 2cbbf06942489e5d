//! Cut out a single image and export the composition.

use std::path::{Path, PathBuf};

use anyhow::Context;

use layercut_common::config::AppConfig;
use layercut_common::error::LayercutResult;
use layercut_document::overlay::TextStylePatch;
use layercut_document::viewport::Point2D;
use layercut_mask::StrokeRecord;
use layercut_session::{LoadOutcome, SessionHandle};

use super::{progress_printer, read_input, StyleArgs};

#[derive(clap::Args, Debug)]
pub struct ComposeArgs {
    /// Photo to cut out (or an already cut-out PNG)
    pub input: PathBuf,

    /// Output PNG (defaults to the configured export filename)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub style: StyleArgs,

    /// Text placed behind the subject
    #[arg(long)]
    pub text: Option<String>,

    /// Text anchor x in image pixels (defaults to the centre)
    #[arg(long, requires = "text")]
    pub text_x: Option<f64>,

    /// Text anchor y in image pixels (defaults to the centre)
    #[arg(long, requires = "text")]
    pub text_y: Option<f64>,

    /// Font size in image pixels
    #[arg(long, requires = "text")]
    pub font_size: Option<f64>,

    /// Text color
    #[arg(long, requires = "text")]
    pub text_color: Option<String>,

    /// Font family list, e.g. "Inter, sans-serif"
    #[arg(long, requires = "text")]
    pub font_family: Option<String>,

    /// JSON file of erase strokes in image pixels
    #[arg(long)]
    pub strokes: Option<PathBuf>,
}

pub async fn run(config: &AppConfig, args: ComposeArgs) -> anyhow::Result<()> {
    println!("Composing: {}", args.input.display());

    let handle = args.style.session(config)?;
    let bytes = read_input(&args.input)?;
    let document = match handle.upload(bytes).await? {
        LoadOutcome::Applied(document) => document,
        LoadOutcome::Stale => anyhow::bail!("upload was superseded"),
    };
    println!(
        "  Subject: {}x{} (via {})",
        document.width,
        document.height,
        handle.gateway_name()
    );

    if let Some(spec) = args.style.background_spec()? {
        handle.with(|s| s.set_background(&spec)).await?;
    }

    if let Some(path) = &args.strokes {
        let count = import_strokes(&handle, path).await?;
        println!("  Strokes: {count}");
    }

    if let Some(text) = &args.text {
        add_text(&handle, text, &args).await?;
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export.filename));
    println!("  Output: {}", output.display());

    let exported = handle
        .export_png_with_progress(Some(progress_printer()))
        .await?;
    exported.write_to(&output)?;
    println!(
        "Export complete: {} ({}x{})",
        output.display(),
        exported.width,
        exported.height
    );
    Ok(())
}

async fn import_strokes(handle: &SessionHandle, path: &Path) -> anyhow::Result<usize> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read strokes {}", path.display()))?;
    let records: Vec<StrokeRecord> = serde_json::from_str(&json)
        .with_context(|| format!("Invalid stroke file {}", path.display()))?;

    handle
        .with(|s| -> LayercutResult<()> {
            for record in &records {
                s.import_stroke(&record.points(), record.width)?;
            }
            Ok(())
        })
        .await?;
    Ok(records.len())
}

async fn add_text(handle: &SessionHandle, text: &str, args: &ComposeArgs) -> anyhow::Result<()> {
    let patch = TextStylePatch {
        content: Some(text.to_string()),
        font_family: args.font_family.clone(),
        font_size: args.font_size,
        color: args.text_color.clone(),
        ..Default::default()
    };
    let (x, y) = (args.text_x, args.text_y);

    let item = handle
        .with(|s| -> LayercutResult<_> {
            let id = s.add_overlay_text(None)?;
            s.update_overlay_text(id, patch)?;
            let center = s.overlay_text(id)?.position;
            s.move_overlay_text(
                id,
                Point2D::new(x.unwrap_or(center.x), y.unwrap_or(center.y)),
            )
        })
        .await?;
    tracing::debug!(id = item.id, x = item.position.x, y = item.position.y, "Text placed");
    Ok(())
}
