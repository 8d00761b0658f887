//! # Portfolio Media Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento della configurazione: file JSON, poi override da CLI
//! - Avvio dello stage richiesto e mappatura degli errori fatali sull'exit code
//!
//! ## Esempio di utilizzo:
//! ```bash
//! optimize-media --root ~/site images --mobile-width 640
//! optimize-media --json analyze
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use portfolio_media_optimizer::{
    config::{DEFAULT_CONFIG_FILE, KIB, MIB},
    json_output::JsonMessage,
    Config, ExternalEncoder, MediaOptimizer, Stage, ToolResolver,
};

#[derive(Parser)]
#[command(name = "optimize-media")]
#[command(about = "Compress portfolio videos and build responsive WebP variants of images")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Videos, then images (default)
    All,
    /// Re-encode oversized videos only
    Videos,
    /// Build WebP / mobile variants of images only
    Images,
    /// Extract missing poster frames for videos
    Thumbnails,
    /// Report what `all` would do without writing anything, .webm videos included
    Analyze,
}

#[derive(Args)]
struct Options {
    /// Project root the media directories are relative to
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Video directory, relative to the root
    #[arg(long, global = true)]
    video_dir: Option<PathBuf>,

    /// Image directory, relative to the root
    #[arg(long, global = true)]
    image_dir: Option<PathBuf>,

    /// Videos at or below this size (MiB) are left alone
    #[arg(long, global = true)]
    video_threshold_mb: Option<u64>,

    /// Width of the mobile video rendition
    #[arg(long, global = true)]
    video_mobile_width: Option<u32>,

    /// Video CRF value (0-51, lower = better quality)
    #[arg(long, global = true)]
    crf: Option<u8>,

    /// CRF of the mobile video rendition
    #[arg(long, global = true)]
    mobile_crf: Option<u8>,

    /// x264 preset
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Video audio bitrate
    #[arg(long, global = true)]
    audio_bitrate: Option<String>,

    /// Mobile breakpoint width for images
    #[arg(long, global = true)]
    mobile_width: Option<u32>,

    /// Desktop WebP quality (1-100)
    #[arg(long, global = true)]
    webp_quality: Option<u8>,

    /// Mobile WebP quality (1-100)
    #[arg(long, global = true)]
    mobile_webp_quality: Option<u8>,

    /// JPEG quality of the mobile fallback (1-100)
    #[arg(long, global = true)]
    fallback_quality: Option<u8>,

    /// Images at or below this size (KiB) are never processed
    #[arg(long, global = true)]
    tiny_floor_kb: Option<u64>,

    /// Number of parallel workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Dry run - don't write or replace any file
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit JSON Lines on stdout instead of progress output
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to <root>/media-optimizer.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long, global = true)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Command {
    fn stage(self) -> Stage {
        match self {
            Self::All => Stage::All,
            Self::Videos => Stage::Videos,
            Self::Images => Stage::Images,
            Self::Thumbnails => Stage::Thumbnails,
            Self::Analyze => Stage::Analyze,
        }
    }
}

impl Options {
    fn config_path(&self) -> PathBuf {
        match (&self.config, &self.root) {
            (Some(path), _) => path.clone(),
            (None, Some(root)) => root.join(DEFAULT_CONFIG_FILE),
            (None, None) => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// CLI flags win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.project_root = root.clone();
        }
        if let Some(dir) = &self.video_dir {
            config.video_dir = dir.clone();
        }
        if let Some(dir) = &self.image_dir {
            config.image_dir = dir.clone();
        }
        if let Some(mb) = self.video_threshold_mb {
            config.video_size_threshold = mb * MIB;
        }
        if let Some(width) = self.video_mobile_width {
            config.video_mobile_width = width;
        }
        if let Some(crf) = self.crf {
            config.desktop_crf = crf;
        }
        if let Some(crf) = self.mobile_crf {
            config.mobile_crf = crf;
        }
        if let Some(preset) = &self.preset {
            config.video_preset = preset.clone();
        }
        if let Some(bitrate) = &self.audio_bitrate {
            config.audio_bitrate = bitrate.clone();
        }
        if let Some(width) = self.mobile_width {
            config.image_mobile_width = width;
        }
        if let Some(q) = self.webp_quality {
            config.webp_quality = q;
        }
        if let Some(q) = self.mobile_webp_quality {
            config.mobile_webp_quality = q;
        }
        if let Some(q) = self.fallback_quality {
            config.fallback_jpeg_quality = q;
        }
        if let Some(kb) = self.tiny_floor_kb {
            config.tiny_file_floor = kb * KIB;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.dry_run |= self.dry_run;
        config.json_output |= self.json;
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let options = &cli.options;
    let config_path = options.config_path();

    let mut config = Config::from_file(&config_path).await?;
    options.apply(&mut config);

    let stage = cli.command.unwrap_or(Command::All).stage();

    if options.save_config {
        config.validate()?;
        config.save_to_file(&config_path).await?;
        info!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    debug!("Effective configuration: {:?}", config);

    let encoder = Arc::new(ExternalEncoder::new(ToolResolver::from_env()));
    let optimizer = MediaOptimizer::new(config, encoder)?;
    optimizer.run(stage).await?;

    // Failed assets are reported in the summary; they do not change the exit code.
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);
    let json = cli.options.json;

    let result = run(cli).await;
    if let Err(e) = &result {
        if json {
            JsonMessage::Error { message: format!("{:#}", e) }.emit();
        }
    }
    result
}
