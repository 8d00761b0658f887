//! # Encoder Module
//!
//! Questo modulo è il confine verso i codec esterni.
//!
//! ## Responsabilità:
//! - Definisce il trait `MediaEncoder`, unico punto di contatto con i codec
//! - `ExternalEncoder`: implementazione di produzione
//!   - **ffmpeg**: ricodifica video (libx264 + AAC, `+faststart`) e poster frame
//!   - **cwebp**: WebP desktop e mobile (resize "fit inside" con `-resize W 0`)
//!   - **image**: fallback JPEG mobile (Lanczos3 + encoder JPEG con qualità)
//! - Verifica all'avvio che i tool necessari siano installati
//!
//! ## Controllo qualità (CRF):
//! - 18-23: Alta qualità
//! - 24-28: Buona qualità (default 26, bilanciato per il web)
//! - 29-35: File piccoli
//!
//! Ogni encode scrive solo sul path di output ricevuto; la promozione al path
//! finale è compito del `Transcoder`.

use crate::config::Config;
use crate::error::OptimizeError;
use crate::tools::{ToolResolver, CWEBP, FFMPEG};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, OptimizeError>;

/// What a run needs the encoder to be able to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Video,
    Image,
    Thumbnail,
}

/// Fixed encode settings for the re-encoded video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProfile {
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl From<&Config> for VideoProfile {
    fn from(config: &Config) -> Self {
        Self {
            crf: config.desktop_crf,
            preset: config.video_preset.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }
}

/// Seam between the pipeline and the codecs that actually write bytes
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Fail with `MissingDependency` if a needed tool cannot be located
    fn ensure_available(&self, needs: &[Capability]) -> Result<()>;

    async fn encode_video(&self, input: &Path, output: &Path, profile: &VideoProfile) -> Result<()>;

    /// `max_width`: fit-inside resize to this width, aspect ratio preserved
    async fn encode_webp(&self, input: &Path, output: &Path, quality: u8, max_width: Option<u32>) -> Result<()>;

    async fn encode_jpeg(&self, input: &Path, output: &Path, quality: u8, max_width: Option<u32>) -> Result<()>;

    async fn extract_frame(&self, video: &Path, output: &Path, offset_secs: f64) -> Result<()>;
}

/// Production encoder backed by ffmpeg, cwebp and the `image` crate
#[derive(Debug, Clone, Default)]
pub struct ExternalEncoder {
    resolver: ToolResolver,
}

impl ExternalEncoder {
    pub fn new(resolver: ToolResolver) -> Self {
        Self { resolver }
    }

    async fn run_tool(&self, tool: &str, purpose: &str, args: Vec<Cow<'_, OsStr>>, input: &Path) -> Result<()> {
        let program = self.resolver.require(tool, purpose)?;
        debug!("{} {:?}", program.display(), args);

        let start_time = Instant::now();
        let output = Command::new(&program)
            .args(args.iter())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OptimizeError::encode(input, purpose, format!("failed to execute {}: {}", tool, e)))?;

        if !output.status.success() {
            return Err(OptimizeError::encode(
                input,
                purpose,
                format!("{} exited with {}: {}", tool, output.status, stderr_tail(&output.stderr)),
            ));
        }

        debug!("{} finished in {:.1}s", tool, start_time.elapsed().as_secs_f64());
        Ok(())
    }
}

#[async_trait]
impl MediaEncoder for ExternalEncoder {
    fn ensure_available(&self, needs: &[Capability]) -> Result<()> {
        for need in needs {
            let (tool, purpose) = match need {
                Capability::Video => (FFMPEG, "video compression"),
                Capability::Thumbnail => (FFMPEG, "thumbnail extraction"),
                Capability::Image => (CWEBP, "WebP conversion"),
            };
            let path = self.resolver.require(tool, purpose)?;
            info!("🔧 {} -> {}", tool, path.display());
        }
        Ok(())
    }

    async fn encode_video(&self, input: &Path, output: &Path, profile: &VideoProfile) -> Result<()> {
        let crf = profile.crf.to_string();
        let args = vec![
            os("-y"), os("-hide_banner"), os("-loglevel"), os("error"),
            os("-i"), path_arg(input),
            os("-c:v"), os("libx264"),
            os("-crf"), owned(&crf),
            os("-preset"), owned(&profile.preset),
            os("-c:a"), os("aac"),
            os("-b:a"), owned(&profile.audio_bitrate),
            os("-movflags"), os("+faststart"),
            path_arg(output),
        ];
        self.run_tool(FFMPEG, "compressed", args, input).await
    }

    async fn encode_webp(&self, input: &Path, output: &Path, quality: u8, max_width: Option<u32>) -> Result<()> {
        let quality = quality.to_string();
        let mut args = vec![os("-quiet"), os("-q"), owned(&quality), os("-m"), os("6"), os("-mt")];
        if let Some(w) = max_width {
            args.extend([os("-resize"), owned(&w.to_string()), os("0")]);
        }
        args.extend([path_arg(input), os("-o"), path_arg(output)]);
        self.run_tool(CWEBP, "webp", args, input).await
    }

    async fn encode_jpeg(&self, input: &Path, output: &Path, quality: u8, max_width: Option<u32>) -> Result<()> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        tokio::task::spawn_blocking(move || {
            write_jpeg_unless_cancelled(&input, &output, quality, max_width, &cancelled)
        })
        .await
        .map_err(|e| OptimizeError::encode(PathBuf::new(), "jpeg", e))?
    }

    async fn extract_frame(&self, video: &Path, output: &Path, offset_secs: f64) -> Result<()> {
        let offset = format!("{:.3}", offset_secs);
        let args = vec![
            os("-y"), os("-hide_banner"), os("-loglevel"), os("error"),
            os("-ss"), owned(&offset),
            os("-i"), path_arg(video),
            os("-frames:v"), os("1"),
            os("-q:v"), os("2"),
            path_arg(output),
        ];
        self.run_tool(FFMPEG, "thumbnail", args, video).await
    }
}

/// Raised when the future awaiting a blocking encode is dropped (timeout).
/// The blocking job itself cannot be aborted, so it checks the flag instead.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// `write_resized_jpeg` for a caller that may give up mid-encode. If the
/// caller has gone away by the time the file is written, the file is removed.
fn write_jpeg_unless_cancelled(
    input: &Path,
    output: &Path,
    quality: u8,
    max_width: Option<u32>,
    cancelled: &AtomicBool,
) -> Result<()> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(OptimizeError::encode(input, "jpeg", "cancelled"));
    }
    let result = write_resized_jpeg(input, output, quality, max_width);
    if cancelled.load(Ordering::SeqCst) {
        let _ = std::fs::remove_file(output);
        return Err(OptimizeError::encode(input, "jpeg", "cancelled"));
    }
    result
}

/// Decode, shrink to `max_width` if wider (never upscale), write a JPEG
pub fn write_resized_jpeg(input: &Path, output: &Path, quality: u8, max_width: Option<u32>) -> Result<()> {
    let img = image::open(input).map_err(|e| OptimizeError::encode(input, "jpeg", e))?;
    let img = match max_width {
        Some(w) if img.width() > w => img.resize(w, u32::MAX, FilterType::Lanczos3),
        _ => img,
    };
    let rgb = img.to_rgb8();

    let mut writer = std::io::BufWriter::new(std::fs::File::create(output)?);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(&rgb)
        .map_err(|e| OptimizeError::encode(input, "jpeg", e))?;
    writer.flush()?;
    Ok(())
}

fn os(s: &'static str) -> Cow<'static, OsStr> {
    Cow::Borrowed(OsStr::new(s))
}

fn owned(s: &str) -> Cow<'static, OsStr> {
    Cow::Owned(s.into())
}

/// Keep a path from being read as a flag by tools without `--` support
fn path_arg(path: &Path) -> Cow<'static, OsStr> {
    if path.as_os_str().to_string_lossy().starts_with('-') {
        Cow::Owned(Path::new(".").join(path).into_os_string())
    } else {
        Cow::Owned(path.as_os_str().to_os_string())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}
