//! Cut out many images with one backdrop.

use std::path::{Path, PathBuf};

use layercut_common::config::AppConfig;
use layercut_document::background::BackgroundSpec;
use layercut_session::{LoadOutcome, SessionHandle};

use super::{read_input, StyleArgs};

#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// Photos to process
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for the exported PNGs
    #[arg(long)]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub style: StyleArgs,
}

pub async fn run(config: &AppConfig, args: BatchArgs) -> anyhow::Result<()> {
    let handle = args.style.session(config)?;
    let background = args.style.background_spec()?;
    std::fs::create_dir_all(&args.out_dir)?;

    let total = args.inputs.len();
    let mut failed = 0usize;
    for (i, input) in args.inputs.iter().enumerate() {
        let output = output_path(&args.out_dir, input);
        print!("[{}/{total}] {} ... ", i + 1, input.display());
        match process_one(&handle, input, &output, background.as_ref()).await {
            Ok((w, h)) => println!("ok ({w}x{h}) -> {}", output.display()),
            Err(e) => {
                println!("failed: {e}");
                tracing::warn!(input = %input.display(), error = %e, "Batch item failed");
                failed += 1;
            }
        }
    }

    println!();
    println!("Processed {} of {total} images", total - failed);
    if failed > 0 {
        anyhow::bail!("{failed} of {total} images failed");
    }
    Ok(())
}

async fn process_one(
    handle: &SessionHandle,
    input: &Path,
    output: &Path,
    background: Option<&BackgroundSpec>,
) -> anyhow::Result<(u32, u32)> {
    let bytes = read_input(input)?;
    if let LoadOutcome::Stale = handle.upload(bytes).await? {
        anyhow::bail!("upload was superseded");
    }
    if let Some(spec) = background {
        handle.with(|s| s.set_background(spec)).await?;
    }
    let exported = handle.export_png().await?;
    exported.write_to(output)?;
    Ok((exported.width, exported.height))
}

/// `<out_dir>/<input stem>.png`
fn output_path(out_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    out_dir.join(format!("{stem}.png"))
}
