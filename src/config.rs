//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con soglie, qualità e directory di lavoro
//! - Fornisce valori di default identici al comportamento storico degli script
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Valida i parametri prima di avviare qualsiasi encode
//!
//! ## Parametri principali:
//! - `video_size_threshold`: sopra questa dimensione un video viene ricodificato (3 MiB)
//! - `desktop_crf` / `mobile_crf`: qualità encoder video (26 / 30)
//! - `image_mobile_width`: breakpoint oltre il quale si crea la variante mobile (800 px)
//! - `webp_quality` / `mobile_webp_quality`: qualità WebP (85 / 85)
//! - `fallback_jpeg_quality`: qualità del fallback JPEG mobile (90)
//! - `tiny_file_floor`: sotto questa dimensione le immagini non vengono toccate (100 KiB)
//! - `workers`: encode concorrenti (1 = sequenziale)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     workers: 2,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;

/// File looked up in the project root when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "media-optimizer.json";

/// Configuration for the media pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project root the media directories are relative to
    pub project_root: PathBuf,
    /// Video root, relative to `project_root` unless absolute
    pub video_dir: PathBuf,
    /// Image root, relative to `project_root` unless absolute
    pub image_dir: PathBuf,

    /// Videos strictly larger than this (bytes) are re-encoded
    pub video_size_threshold: u64,
    /// Target width of a mobile video variant (not produced yet)
    pub video_mobile_width: u32,
    /// CRF for the re-encoded video (0-51, lower = better quality)
    pub desktop_crf: u8,
    /// CRF for a mobile video variant (not produced yet)
    pub mobile_crf: u8,
    /// x264 preset
    pub video_preset: String,
    /// Audio bitrate for the re-encoded video
    pub audio_bitrate: String,

    /// Images wider than this get a resized mobile variant
    pub image_mobile_width: u32,
    /// Desktop WebP quality (1-100)
    pub webp_quality: u8,
    /// Mobile WebP quality (1-100)
    pub mobile_webp_quality: u8,
    /// Quality of the mobile JPEG fallback (1-100)
    pub fallback_jpeg_quality: u8,
    /// Images at or below this size (bytes) are left untouched
    pub tiny_file_floor: u64,

    /// Offset of the poster frame grabbed for `<stem>_thumb.jpg`
    pub thumbnail_offset_secs: f64,

    /// Number of assets encoded concurrently
    pub workers: usize,
    /// Per-asset timeout for videos
    pub video_timeout_secs: u64,
    /// Per-asset timeout for images
    pub image_timeout_secs: u64,

    /// Evaluate only, never write
    pub dry_run: bool,
    /// Emit JSON Lines events on stdout instead of progress lines
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            video_dir: PathBuf::from("public/motion"),
            image_dir: PathBuf::from("public/images"),
            video_size_threshold: 3 * MIB,
            video_mobile_width: 480,
            desktop_crf: 26,
            mobile_crf: 30,
            video_preset: "slow".to_string(),
            audio_bitrate: "128k".to_string(),
            image_mobile_width: 800,
            webp_quality: 85,
            mobile_webp_quality: 85,
            fallback_jpeg_quality: 90,
            tiny_file_floor: 100 * KIB,
            thumbnail_offset_secs: 0.5,
            workers: 1,
            video_timeout_secs: 900,
            image_timeout_secs: 180,
            dry_run: false,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizeError> {
        for (name, quality) in [
            ("WebP quality", self.webp_quality),
            ("Mobile WebP quality", self.mobile_webp_quality),
            ("Fallback JPEG quality", self.fallback_jpeg_quality),
        ] {
            if quality == 0 || quality > 100 {
                return Err(OptimizeError::Config(format!("{} must be between 1 and 100", name)));
            }
        }

        if self.desktop_crf > 51 || self.mobile_crf > 51 {
            return Err(OptimizeError::Config("Video CRF must be between 0 and 51".into()));
        }

        if self.image_mobile_width == 0 {
            return Err(OptimizeError::Config("Image mobile width must be greater than 0".into()));
        }

        if self.workers == 0 {
            return Err(OptimizeError::Config("Number of workers must be greater than 0".into()));
        }

        if self.video_timeout_secs == 0 || self.image_timeout_secs == 0 {
            return Err(OptimizeError::Config("Timeouts must be greater than 0 seconds".into()));
        }

        if !self.thumbnail_offset_secs.is_finite() || self.thumbnail_offset_secs < 0.0 {
            return Err(OptimizeError::Config("Thumbnail offset must be a non-negative number".into()));
        }

        if self.video_preset.trim().is_empty() || self.audio_bitrate.trim().is_empty() {
            return Err(OptimizeError::Config("Video preset and audio bitrate must not be empty".into()));
        }

        Ok(())
    }

    /// Absolute-or-root-relative video directory
    pub fn video_root(&self) -> PathBuf {
        self.resolve(&self.video_dir)
    }

    /// Absolute-or-root-relative image directory
    pub fn image_root(&self) -> PathBuf {
        self.resolve(&self.image_dir)
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        }
    }

    /// Timeout applied to a single video asset
    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    /// Timeout applied to a single image asset
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    /// Worker count capped at the available parallelism
    pub fn effective_workers(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.workers.clamp(1, cpus.max(1))
    }

    /// Load configuration from file, falling back to defaults if it is absent
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| OptimizeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.webp_quality = 0;
        assert!(config.validate().is_err());

        config.webp_quality = 85;
        config.desktop_crf = 52;
        assert!(config.validate().is_err());

        config.desktop_crf = 26;
        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 1;
        config.image_mobile_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.video_size_threshold, 3 * MIB);
        assert_eq!(config.desktop_crf, 26);
        assert_eq!(config.image_mobile_width, 800);
        assert_eq!(config.webp_quality, 85);
        assert_eq!(config.fallback_jpeg_quality, 90);
        assert_eq!(config.tiny_file_floor, 100 * KIB);
        assert_eq!(config.workers, 1);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_media_roots_resolve_against_project_root() {
        let config = Config {
            project_root: PathBuf::from("/site"),
            ..Default::default()
        };
        assert_eq!(config.video_root(), PathBuf::from("/site/public/motion"));
        assert_eq!(config.image_root(), PathBuf::from("/site/public/images"));

        let config = Config {
            image_dir: PathBuf::from("/elsewhere/img"),
            ..config
        };
        assert_eq!(config.image_root(), PathBuf::from("/elsewhere/img"));
    }

    #[test]
    fn test_effective_workers_never_zero() {
        let config = Config { workers: 64, ..Default::default() };
        let workers = config.effective_workers();
        assert!(workers >= 1 && workers <= 64);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(DEFAULT_CONFIG_FILE);

        let original_config = Config {
            webp_quality: 70,
            desktop_crf: 24,
            audio_bitrate: "192k".to_string(),
            workers: 3,
            dry_run: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.webp_quality, 70);
        assert_eq!(loaded_config.desktop_crf, 24);
        assert_eq!(loaded_config.audio_bitrate, "192k");
        assert_eq!(loaded_config.workers, 3);
        assert!(loaded_config.dry_run);
    }

    #[tokio::test]
    async fn test_partial_config_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(&config_path, r#"{ "image_mobile_width": 640 }"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.image_mobile_width, 640);
        assert_eq!(config.webp_quality, 85);
    }

    #[tokio::test]
    async fn test_missing_config_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(config.workers, 1);
    }
}
