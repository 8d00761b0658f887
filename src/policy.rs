//! # Optimization Policy Module
//!
//! Decide, per asset, se serve una trasformazione e quali varianti produrre.
//!
//! ## Regole:
//! - **Video**: si ricodifica solo sopra `video_size_threshold`; un `.webm`
//!   sopra soglia viene solo segnalato
//! - **Immagini**: si lavora solo sopra `tiny_file_floor` e solo se manca almeno
//!   una variante derivata valida (desktop WebP, mobile WebP, fallback mobile)
//! - **Thumbnail**: si estrae un frame solo se `<stem>_thumb.jpg` manca
//!
//! ## Convenzione dei nomi (contratto con il sito):
//! ```text
//! hero.png  ->  hero.webp            (desktop)
//!           ->  hero-mobile.webp     (mobile, ridimensionata o copia identica)
//!           ->  hero-mobile.png      (fallback JPEG per browser datati)
//! clip.mp4  ->  clip.mp4             (ricodificato in place)
//!           ->  clip_thumb.jpg       (poster frame)
//! ```
//!
//! La decisione è pura: dipende solo dai metadati dell'asset, dalla config e
//! dall'esistenza delle varianti, ed è ricalcolata a ogni run.

use crate::config::Config;
use crate::error::OptimizeError;
use crate::file_manager::{FileManager, MediaKind, MOBILE_SUFFIX, THUMB_SUFFIX};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One source file considered by the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub size: u64,
    pub kind: MediaKind,
    /// (width, height), images only
    pub dimensions: Option<(u32, u32)>,
}

impl MediaAsset {
    pub fn new(path: PathBuf, size: u64, kind: MediaKind) -> Self {
        Self { path, size, kind, dimensions: None }
    }

    /// Stat a discovered path. Size is read once and never refreshed.
    pub async fn discover(path: &Path) -> Result<Self, OptimizeError> {
        let kind = MediaKind::from_path(path).ok_or_else(|| OptimizeError::MetadataReadFailure {
            path: path.to_path_buf(),
            message: "unsupported media type".to_string(),
        })?;
        let size = FileManager::file_size(path).await?;
        Ok(Self::new(path.to_path_buf(), size, kind))
    }

    /// Read pixel dimensions from the image header
    pub fn probe_dimensions(&mut self) -> Result<(u32, u32), OptimizeError> {
        let dims = image::image_dimensions(&self.path).map_err(|e| OptimizeError::MetadataReadFailure {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.dimensions = Some(dims);
        Ok(dims)
    }

    pub fn width(&self) -> Option<u32> {
        self.dimensions.map(|(w, _)| w)
    }

    pub fn file_name(&self) -> String {
        self.path.file_name().unwrap_or_default().to_string_lossy().into_owned()
    }
}

/// Derived output kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantTag {
    /// Re-encoded video replacing the original
    Compressed,
    DesktopWebp,
    /// Resized to the mobile breakpoint
    MobileWebp,
    /// Resized JPEG, named after the original extension
    MobileFallback,
    /// Byte-identical copy of the desktop WebP for narrow images
    MobileWebpCopy,
    /// Poster frame of a video
    Thumbnail,
}

impl VariantTag {
    pub const ALL: [VariantTag; 6] = [
        Self::Compressed,
        Self::DesktopWebp,
        Self::MobileWebp,
        Self::MobileFallback,
        Self::MobileWebpCopy,
        Self::Thumbnail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::DesktopWebp => "desktop-webp",
            Self::MobileWebp => "mobile-webp",
            Self::MobileFallback => "mobile-fallback",
            Self::MobileWebpCopy => "mobile-webp-copy",
            Self::Thumbnail => "thumbnail",
        }
    }

    /// Final path of this variant for `source`
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default().to_string_lossy();
        let file_name = match self {
            Self::Compressed => return source.to_path_buf(),
            Self::DesktopWebp => format!("{}.webp", stem),
            Self::MobileWebp | Self::MobileWebpCopy => format!("{}{}.webp", stem, MOBILE_SUFFIX),
            Self::MobileFallback => {
                let ext = source.extension().unwrap_or_default().to_string_lossy();
                format!("{}{}.{}", stem, MOBILE_SUFFIX, ext)
            }
            Self::Thumbnail => format!("{}{}.jpg", stem, THUMB_SUFFIX),
        };
        source.with_file_name(file_name)
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an asset was (or was not) selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    AboveSizeThreshold,
    BelowSizeThreshold,
    BelowTinyFloor,
    MissingDesktopWebp,
    MissingMobileWebp,
    MissingMobileFallback,
    AllDerivativesPresent,
    MissingThumbnail,
    ThumbnailPresent,
    /// Container only reported by the analysis
    NotReencoded,
}

impl fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AboveSizeThreshold => "above size threshold",
            Self::BelowSizeThreshold => "already small enough",
            Self::BelowTinyFloor => "already small",
            Self::MissingDesktopWebp => "missing desktop WebP",
            Self::MissingMobileWebp => "missing mobile WebP",
            Self::MissingMobileFallback => "missing mobile fallback",
            Self::AllDerivativesPresent => "all variants present",
            Self::MissingThumbnail => "missing thumbnail",
            Self::ThumbnailPresent => "thumbnail exists",
            Self::NotReencoded => "only mp4 is re-encoded",
        };
        f.write_str(text)
    }
}

/// What the pipeline is asked to do with an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Re-encode videos, derive WebP variants for images
    Optimize,
    /// Extract a poster frame for videos
    Thumbnail,
}

/// Pure decision record for one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationPolicy {
    pub should_process: bool,
    pub reasons: BTreeSet<PolicyReason>,
    pub target_variants: Vec<VariantTag>,
}

impl OptimizationPolicy {
    fn skip(reason: PolicyReason) -> Self {
        Self {
            should_process: false,
            reasons: BTreeSet::from([reason]),
            target_variants: Vec::new(),
        }
    }

    pub fn describe_reasons(&self) -> String {
        self.reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
    }
}

/// Evaluate an asset against the filesystem state of its variants
pub fn evaluate(asset: &MediaAsset, config: &Config, task: TaskKind) -> OptimizationPolicy {
    evaluate_with(asset, config, task, FileManager::is_valid_artifact)
}

/// Evaluate an asset with a custom artifact validity check
pub fn evaluate_with<F>(asset: &MediaAsset, config: &Config, task: TaskKind, is_valid: F) -> OptimizationPolicy
where
    F: Fn(&Path) -> bool,
{
    match (task, asset.kind) {
        (TaskKind::Thumbnail, _) => thumbnail_policy(asset, is_valid),
        (TaskKind::Optimize, MediaKind::Video) => video_policy(asset, config),
        (TaskKind::Optimize, MediaKind::Image) => image_policy(asset, config, is_valid),
    }
}

fn video_policy(asset: &MediaAsset, config: &Config) -> OptimizationPolicy {
    if asset.size > config.video_size_threshold && FileManager::is_report_only_video(&asset.path) {
        OptimizationPolicy {
            should_process: false,
            reasons: BTreeSet::from([PolicyReason::AboveSizeThreshold, PolicyReason::NotReencoded]),
            target_variants: Vec::new(),
        }
    } else if asset.size > config.video_size_threshold {
        OptimizationPolicy {
            should_process: true,
            reasons: BTreeSet::from([PolicyReason::AboveSizeThreshold]),
            target_variants: vec![VariantTag::Compressed],
        }
    } else {
        OptimizationPolicy::skip(PolicyReason::BelowSizeThreshold)
    }
}

fn image_policy<F>(asset: &MediaAsset, config: &Config, is_valid: F) -> OptimizationPolicy
where
    F: Fn(&Path) -> bool,
{
    if asset.size <= config.tiny_file_floor {
        return OptimizationPolicy::skip(PolicyReason::BelowTinyFloor);
    }

    // Unknown width is treated as narrow: no resize is attempted.
    let wide = asset.width().map(|w| w > config.image_mobile_width).unwrap_or(false);

    let mut reasons = BTreeSet::new();
    if !is_valid(&VariantTag::DesktopWebp.output_path(&asset.path)) {
        reasons.insert(PolicyReason::MissingDesktopWebp);
    }
    if !is_valid(&VariantTag::MobileWebp.output_path(&asset.path)) {
        reasons.insert(PolicyReason::MissingMobileWebp);
    }
    if wide && !is_valid(&VariantTag::MobileFallback.output_path(&asset.path)) {
        reasons.insert(PolicyReason::MissingMobileFallback);
    }

    if reasons.is_empty() {
        return OptimizationPolicy::skip(PolicyReason::AllDerivativesPresent);
    }

    let target_variants = if wide {
        vec![VariantTag::DesktopWebp, VariantTag::MobileWebp, VariantTag::MobileFallback]
    } else {
        vec![VariantTag::DesktopWebp, VariantTag::MobileWebpCopy]
    };

    OptimizationPolicy {
        should_process: true,
        reasons,
        target_variants,
    }
}

fn thumbnail_policy<F>(asset: &MediaAsset, is_valid: F) -> OptimizationPolicy
where
    F: Fn(&Path) -> bool,
{
    if asset.kind != MediaKind::Video {
        return OptimizationPolicy::skip(PolicyReason::ThumbnailPresent);
    }
    if is_valid(&VariantTag::Thumbnail.output_path(&asset.path)) {
        OptimizationPolicy::skip(PolicyReason::ThumbnailPresent)
    } else {
        OptimizationPolicy {
            should_process: true,
            reasons: BTreeSet::from([PolicyReason::MissingThumbnail]),
            target_variants: vec![VariantTag::Thumbnail],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KIB, MIB};
    use std::collections::HashSet;

    fn image(size: u64, width: u32) -> MediaAsset {
        MediaAsset {
            dimensions: Some((width, width * 3 / 4)),
            ..MediaAsset::new(PathBuf::from("/site/images/hero.png"), size, MediaKind::Image)
        }
    }

    fn video(size: u64) -> MediaAsset {
        MediaAsset::new(PathBuf::from("/site/motion/clip.mp4"), size, MediaKind::Video)
    }

    fn nothing_exists(_: &Path) -> bool {
        false
    }

    #[test]
    fn test_variant_naming_contract() {
        let src = Path::new("/site/images/hero.PNG");
        assert_eq!(VariantTag::DesktopWebp.output_path(src), PathBuf::from("/site/images/hero.webp"));
        assert_eq!(VariantTag::MobileWebp.output_path(src), PathBuf::from("/site/images/hero-mobile.webp"));
        assert_eq!(VariantTag::MobileWebpCopy.output_path(src), PathBuf::from("/site/images/hero-mobile.webp"));
        assert_eq!(VariantTag::MobileFallback.output_path(src), PathBuf::from("/site/images/hero-mobile.PNG"));
        assert_eq!(VariantTag::Compressed.output_path(Path::new("/m/clip.mp4")), PathBuf::from("/m/clip.mp4"));
        assert_eq!(VariantTag::Thumbnail.output_path(Path::new("/m/clip.mp4")), PathBuf::from("/m/clip_thumb.jpg"));
    }

    #[test]
    fn test_video_threshold_is_strict() {
        let config = Config::default();
        assert!(evaluate_with(&video(5 * MIB), &config, TaskKind::Optimize, nothing_exists).should_process);
        let at = evaluate_with(&video(3 * MIB), &config, TaskKind::Optimize, nothing_exists);
        assert!(!at.should_process);
        assert!(at.reasons.contains(&PolicyReason::BelowSizeThreshold));
    }

    #[test]
    fn test_large_webm_is_flagged_but_not_processed() {
        let config = Config::default();
        let webm = MediaAsset::new(PathBuf::from("/site/motion/loop.webm"), 8 * MIB, MediaKind::Video);
        let policy = evaluate_with(&webm, &config, TaskKind::Optimize, nothing_exists);
        assert!(!policy.should_process);
        assert!(policy.target_variants.is_empty());
        assert!(policy.reasons.contains(&PolicyReason::AboveSizeThreshold));
        assert!(policy.reasons.contains(&PolicyReason::NotReencoded));
    }

    #[test]
    fn test_images_at_or_below_floor_are_skipped() {
        let config = Config::default();
        for size in [0, 50 * KIB, 100 * KIB] {
            let policy = evaluate_with(&image(size, 4000), &config, TaskKind::Optimize, nothing_exists);
            assert!(!policy.should_process, "size {} should be skipped", size);
            assert!(policy.target_variants.is_empty());
        }
    }

    #[test]
    fn test_wide_image_targets_resized_variants() {
        let config = Config::default();
        let policy = evaluate_with(&image(MIB, 2000), &config, TaskKind::Optimize, nothing_exists);
        assert!(policy.should_process);
        assert_eq!(
            policy.target_variants,
            vec![VariantTag::DesktopWebp, VariantTag::MobileWebp, VariantTag::MobileFallback]
        );
        assert!(policy.reasons.contains(&PolicyReason::MissingMobileFallback));
    }

    #[test]
    fn test_narrow_image_targets_copy() {
        let config = Config::default();
        let policy = evaluate_with(&image(MIB, 800), &config, TaskKind::Optimize, nothing_exists);
        assert_eq!(policy.target_variants, vec![VariantTag::DesktopWebp, VariantTag::MobileWebpCopy]);
        assert!(!policy.reasons.contains(&PolicyReason::MissingMobileFallback));
    }

    #[test]
    fn test_fully_derived_image_is_skipped() {
        let config = Config::default();
        let asset = image(MIB, 2000);
        let present: HashSet<PathBuf> = [VariantTag::DesktopWebp, VariantTag::MobileWebp, VariantTag::MobileFallback]
            .iter()
            .map(|v| v.output_path(&asset.path))
            .collect();

        let policy = evaluate_with(&asset, &config, TaskKind::Optimize, |p| present.contains(p));
        assert!(!policy.should_process);
        assert!(policy.reasons.contains(&PolicyReason::AllDerivativesPresent));
    }

    #[test]
    fn test_missing_fallback_alone_triggers_processing() {
        let config = Config::default();
        let asset = image(MIB, 2000);
        let fallback = VariantTag::MobileFallback.output_path(&asset.path);

        let policy = evaluate_with(&asset, &config, TaskKind::Optimize, |p| p != fallback);
        assert!(policy.should_process);
        assert_eq!(policy.reasons, BTreeSet::from([PolicyReason::MissingMobileFallback]));
    }

    #[test]
    fn test_thumbnail_policy() {
        let config = Config::default();
        let clip = video(MIB);
        let policy = evaluate_with(&clip, &config, TaskKind::Thumbnail, nothing_exists);
        assert_eq!(policy.target_variants, vec![VariantTag::Thumbnail]);

        let policy = evaluate_with(&clip, &config, TaskKind::Thumbnail, |_| true);
        assert!(!policy.should_process);
    }

    #[test]
    fn test_variant_tags_serialize_kebab_case() {
        let json = serde_json::to_string(&VariantTag::MobileFallback).unwrap();
        assert_eq!(json, "\"mobile-fallback\"");
    }
}
