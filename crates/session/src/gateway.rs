//! Segmentation gateways: raw image bytes in, subject raster with alpha out.
//!
//! The segmentation model is external. A gateway only has to produce an RGBA
//! image; failures of the model map to `Segmentation`, output that cannot be
//! decoded maps to `Decode`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use image::RgbaImage;

use layercut_common::error::{LayercutError, LayercutResult};

/// Abstract interface to a background-removal service.
#[async_trait::async_trait]
pub trait SegmentationGateway: Send + Sync {
    /// Cut the subject out of `image` (encoded bytes).
    async fn segment(&self, image: &[u8]) -> LayercutResult<RgbaImage>;

    /// Gateway name, recorded on the document.
    fn name(&self) -> &str;
}

/// Decode gateway output (or any encoded image) to RGBA.
pub fn decode_subject(bytes: &[u8]) -> LayercutResult<RgbaImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| LayercutError::decode(format!("segmentation output: {e}")))?;
    let rgba = decoded.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(LayercutError::decode("segmentation output has zero size"));
    }
    Ok(rgba)
}

/// Treats the input as an already cut-out image (e.g. a transparent PNG).
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughGateway;

#[async_trait::async_trait]
impl SegmentationGateway for PassthroughGateway {
    async fn segment(&self, image: &[u8]) -> LayercutResult<RgbaImage> {
        decode_subject(image)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Runs an external background-removal program.
///
/// The command template is split into words the way a POSIX shell would,
/// honouring single quotes, double quotes and backslash escapes, so paths
/// with spaces can be quoted. No other shell syntax is interpreted.
/// `{input}` and `{output}` are replaced by temporary file paths. The program
/// must write a PNG with alpha to `{output}` and exit with status 0. Dropping
/// the `segment` future kills the program and removes the temporary files.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

static NEXT_JOB: AtomicU64 = AtomicU64::new(0);

impl CommandGateway {
    pub fn from_template(template: &str) -> LayercutResult<Self> {
        let mut parts = split_template(template)?.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| LayercutError::invalid_input("segmentation command is empty"))?;
        let args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains("{output}")) {
            return Err(LayercutError::invalid_input(
                "segmentation command must reference {output}",
            ));
        }
        Ok(Self {
            program,
            args,
            work_dir: std::env::temp_dir(),
        })
    }

    /// Directory for the temporary input/output files.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    fn job_paths(&self, image: &[u8]) -> (PathBuf, PathBuf) {
        let ext = image::guess_format(image)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("img");
        let job = format!(
            "layercut-{}-{}",
            std::process::id(),
            NEXT_JOB.fetch_add(1, Ordering::Relaxed)
        );
        (
            self.work_dir.join(format!("{job}-in.{ext}")),
            self.work_dir.join(format!("{job}-out.png")),
        )
    }

    fn expand(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    async fn run(&self, input: &Path, output: &Path, image: &[u8]) -> LayercutResult<RgbaImage> {
        tokio::fs::write(input, image).await?;
        let args = self.expand(input, output);
        tracing::debug!(program = %self.program, ?args, "Running segmentation command");

        let result = tokio::process::Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LayercutError::segmentation(format!("failed to start {}: {e}", self.program))
            })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(LayercutError::segmentation(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        let bytes = match tokio::fs::read(output).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LayercutError::segmentation(format!(
                    "{} produced no output",
                    self.program
                )));
            }
            Err(e) => return Err(e.into()),
        };
        decode_subject(&bytes)
    }
}

#[async_trait::async_trait]
impl SegmentationGateway for CommandGateway {
    async fn segment(&self, image: &[u8]) -> LayercutResult<RgbaImage> {
        let (input, output) = self.job_paths(image);
        let files = JobFiles([input, output]);
        let started = Instant::now();
        let result = self.run(&files.0[0], &files.0[1], image).await;
        drop(files);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(subject) => tracing::info!(
                processing_time_ms,
                width = subject.width(),
                height = subject.height(),
                "Segmentation finished"
            ),
            Err(e) => tracing::warn!(processing_time_ms, error = %e, "Segmentation failed"),
        }
        result
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Temporary files of one job, removed when dropped.
struct JobFiles([PathBuf; 2]);

impl Drop for JobFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
                }
            }
        }
    }
}

/// Split a command template into words.
///
/// Single quotes keep their contents literal. Inside double quotes only
/// `\"` and `\\` are escapes. Outside quotes a backslash escapes the next
/// character.
fn split_template(template: &str) -> LayercutResult<Vec<String>> {
    let unterminated = || LayercutError::invalid_input("unterminated quote in segmentation command");
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                let escaped = chars.next().ok_or_else(|| {
                    LayercutError::invalid_input("segmentation command ends with a backslash")
                })?;
                current.push(escaped);
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
