//! # Transcoder Adapter Module
//!
//! Trasforma un asset nelle varianti richieste dalla policy con disciplina
//! swap-on-success.
//!
//! ## Pipeline per asset:
//! 1. Ogni variante viene scritta su `temp_<nome finale>` nella stessa directory
//! 2. Se una variante fallisce, tutti i temp dell'asset vengono eliminati e
//!    nessun file finale viene toccato
//! 3. Solo quando tutte le varianti sono pronte, ogni temp viene verificato
//!    (esiste, non vuoto), sincronizzato su disco e rinominato sul path finale
//!
//! ## Video:
//! Il file originale viene sostituito solo dopo che l'encoder ha riportato
//! successo e il temp è verificato su disco. Se il risultato non è più
//! piccolo dell'originale, il temp viene scartato e l'originale resta.

use crate::config::Config;
use crate::encoder::{MediaEncoder, VideoProfile};
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::policy::{MediaAsset, VariantTag};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A file produced from an asset, only ever built after a successful promote
#[derive(Debug, Clone, Serialize)]
pub struct DerivedArtifact {
    pub source: PathBuf,
    pub path: PathBuf,
    pub variant: VariantTag,
    pub size: u64,
}

/// Runs the encoder for each variant and promotes the results
#[derive(Clone)]
pub struct Transcoder {
    encoder: Arc<dyn MediaEncoder>,
    config: Arc<Config>,
}

struct Staged {
    variant: VariantTag,
    temp: PathBuf,
    dest: PathBuf,
}

impl Transcoder {
    pub fn new(encoder: Arc<dyn MediaEncoder>, config: Arc<Config>) -> Self {
        Self { encoder, config }
    }

    /// Produce every variant of `asset`, all or nothing
    pub async fn apply(&self, asset: &MediaAsset, variants: &[VariantTag]) -> Result<Vec<DerivedArtifact>, OptimizeError> {
        let mut staged: Vec<Staged> = Vec::with_capacity(variants.len());

        for &variant in variants {
            let dest = variant.output_path(&asset.path);
            let temp = FileManager::temp_path_for(&dest);
            debug!("Encoding {} ({}) -> {}", asset.file_name(), variant, temp.display());

            if let Err(e) = self.encode_variant(asset, variant, &temp, &staged).await {
                let _ = tokio::fs::remove_file(&temp).await;
                discard(&staged).await;
                return Err(relabel(e, &asset.path, variant));
            }
            staged.push(Staged { variant, temp, dest });
        }

        self.promote_all(asset, staged).await
    }

    /// Delete the temp outputs an interrupted `apply` may have left behind
    pub async fn discard_temps(asset: &MediaAsset, variants: &[VariantTag]) {
        for variant in variants {
            let temp = FileManager::temp_path_for(&variant.output_path(&asset.path));
            if tokio::fs::remove_file(&temp).await.is_ok() {
                debug!("Removed interrupted output {}", temp.display());
            }
        }
    }

    async fn encode_variant(
        &self,
        asset: &MediaAsset,
        variant: VariantTag,
        temp: &Path,
        staged: &[Staged],
    ) -> Result<(), OptimizeError> {
        let config = &self.config;
        let src = asset.path.as_path();
        match variant {
            VariantTag::Compressed => {
                self.encoder.encode_video(src, temp, &VideoProfile::from(config.as_ref())).await
            }
            VariantTag::DesktopWebp => self.encoder.encode_webp(src, temp, config.webp_quality, None).await,
            VariantTag::MobileWebp => {
                self.encoder
                    .encode_webp(src, temp, config.mobile_webp_quality, Some(config.image_mobile_width))
                    .await
            }
            VariantTag::MobileFallback => {
                self.encoder
                    .encode_jpeg(src, temp, config.fallback_jpeg_quality, Some(config.image_mobile_width))
                    .await
            }
            VariantTag::MobileWebpCopy => {
                // Prefer the desktop WebP staged in this pass, else the promoted one.
                let desktop = staged
                    .iter()
                    .find(|s| s.variant == VariantTag::DesktopWebp)
                    .map(|s| s.temp.clone())
                    .unwrap_or_else(|| VariantTag::DesktopWebp.output_path(src));
                tokio::fs::copy(&desktop, temp).await.map(|_| ()).map_err(OptimizeError::from)
            }
            VariantTag::Thumbnail => {
                self.encoder.extract_frame(src, temp, config.thumbnail_offset_secs).await
            }
        }
    }

    async fn promote_all(&self, asset: &MediaAsset, staged: Vec<Staged>) -> Result<Vec<DerivedArtifact>, OptimizeError> {
        let mut artifacts = Vec::with_capacity(staged.len());

        for (i, item) in staged.iter().enumerate() {
            if item.variant == VariantTag::Compressed {
                let new_size = FileManager::file_size(&item.temp).await.unwrap_or(0);
                if new_size >= asset.size && new_size > 0 {
                    warn!(
                        "⚠️ {} did not shrink ({} -> {}), keeping original",
                        asset.file_name(),
                        FileManager::format_size(asset.size),
                        FileManager::format_size(new_size)
                    );
                    let _ = tokio::fs::remove_file(&item.temp).await;
                    artifacts.push(DerivedArtifact {
                        source: asset.path.clone(),
                        path: asset.path.clone(),
                        variant: item.variant,
                        size: asset.size,
                    });
                    continue;
                }
            }

            if let Err(e) = FileManager::promote(&item.temp, &item.dest).await {
                discard(&staged[i + 1..]).await;
                return Err(e);
            }

            let size = FileManager::file_size(&item.dest).await?;
            if size > asset.size {
                warn!(
                    "⚠️ {} is larger than its source ({} > {})",
                    item.dest.display(),
                    FileManager::format_size(size),
                    FileManager::format_size(asset.size)
                );
            }
            artifacts.push(DerivedArtifact {
                source: asset.path.clone(),
                path: item.dest.clone(),
                variant: item.variant,
                size,
            });
        }

        Ok(artifacts)
    }
}

async fn discard(staged: &[Staged]) {
    for item in staged {
        let _ = tokio::fs::remove_file(&item.temp).await;
    }
}

fn relabel(error: OptimizeError, path: &Path, variant: VariantTag) -> OptimizeError {
    match error {
        OptimizeError::EncodeFailure { message, .. } => OptimizeError::encode(path, variant, message),
        OptimizeError::Io(e) => OptimizeError::encode(path, variant, e),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Capability;
    use crate::file_manager::MediaKind;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Writes fixed bytes per call, optionally failing on one kind of call
    struct FakeEncoder {
        fail_jpeg: bool,
        video_bytes: usize,
    }

    #[async_trait]
    impl MediaEncoder for FakeEncoder {
        fn ensure_available(&self, _: &[Capability]) -> Result<(), OptimizeError> {
            Ok(())
        }

        async fn encode_video(&self, _: &Path, output: &Path, _: &VideoProfile) -> Result<(), OptimizeError> {
            tokio::fs::write(output, vec![7u8; self.video_bytes]).await?;
            Ok(())
        }

        async fn encode_webp(&self, _: &Path, output: &Path, q: u8, w: Option<u32>) -> Result<(), OptimizeError> {
            tokio::fs::write(output, format!("webp q={} w={:?}", q, w)).await?;
            Ok(())
        }

        async fn encode_jpeg(&self, input: &Path, output: &Path, _: u8, _: Option<u32>) -> Result<(), OptimizeError> {
            if self.fail_jpeg {
                tokio::fs::write(output, b"half").await?;
                return Err(OptimizeError::encode(input, "jpeg", "simulated"));
            }
            tokio::fs::write(output, b"jpeg").await?;
            Ok(())
        }

        async fn extract_frame(&self, _: &Path, output: &Path, _: f64) -> Result<(), OptimizeError> {
            tokio::fs::write(output, b"frame").await?;
            Ok(())
        }
    }

    fn transcoder(fail_jpeg: bool, video_bytes: usize) -> Transcoder {
        Transcoder::new(Arc::new(FakeEncoder { fail_jpeg, video_bytes }), Arc::new(Config::default()))
    }

    fn image_asset(dir: &Path) -> MediaAsset {
        let path = dir.join("hero.png");
        std::fs::write(&path, vec![1u8; 4096]).unwrap();
        MediaAsset::new(path, 4096, MediaKind::Image)
    }

    #[tokio::test]
    async fn test_wide_image_variants_are_promoted() {
        let temp_dir = TempDir::new().unwrap();
        let asset = image_asset(temp_dir.path());
        let variants = [VariantTag::DesktopWebp, VariantTag::MobileWebp, VariantTag::MobileFallback];

        let artifacts = transcoder(false, 0).apply(&asset, &variants).await.unwrap();

        assert_eq!(artifacts.len(), 3);
        let mobile = std::fs::read_to_string(temp_dir.path().join("hero-mobile.webp")).unwrap();
        assert_eq!(mobile, "webp q=85 w=Some(800)");
        assert_eq!(std::fs::read(temp_dir.path().join("hero-mobile.png")).unwrap(), b"jpeg");
        assert!(!temp_dir.path().join("temp_hero.webp").exists());
    }

    #[tokio::test]
    async fn test_copy_variant_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let asset = image_asset(temp_dir.path());

        transcoder(false, 0)
            .apply(&asset, &[VariantTag::DesktopWebp, VariantTag::MobileWebpCopy])
            .await
            .unwrap();

        let desktop = std::fs::read(temp_dir.path().join("hero.webp")).unwrap();
        let mobile = std::fs::read(temp_dir.path().join("hero-mobile.webp")).unwrap();
        assert_eq!(desktop, mobile);
    }

    #[tokio::test]
    async fn test_failed_variant_promotes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let asset = image_asset(temp_dir.path());
        let variants = [VariantTag::DesktopWebp, VariantTag::MobileWebp, VariantTag::MobileFallback];

        let err = transcoder(true, 0).apply(&asset, &variants).await.unwrap_err();

        match err {
            OptimizeError::EncodeFailure { variant, .. } => assert_eq!(variant, "mobile-fallback"),
            other => panic!("unexpected error: {other}"),
        }
        let mut names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["hero.png"]);
        assert_eq!(std::fs::read(&asset.path).unwrap(), vec![1u8; 4096]);
    }

    #[tokio::test]
    async fn test_video_replaced_only_when_smaller() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();
        let asset = MediaAsset::new(path.clone(), 1000, MediaKind::Video);

        let artifacts = transcoder(false, 400).apply(&asset, &[VariantTag::Compressed]).await.unwrap();
        assert_eq!(artifacts[0].size, 400);
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 400]);

        std::fs::write(&path, vec![0u8; 1000]).unwrap();
        let artifacts = transcoder(false, 1500).apply(&asset, &[VariantTag::Compressed]).await.unwrap();
        assert_eq!(artifacts[0].size, 1000);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 1000]);
        assert!(!temp_dir.path().join("temp_clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_empty_encoder_output_is_partial_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();
        let asset = MediaAsset::new(path.clone(), 1000, MediaKind::Video);

        let err = transcoder(false, 0).apply(&asset, &[VariantTag::Compressed]).await.unwrap_err();
        assert!(matches!(err, OptimizeError::PartialWriteDetected(_)));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 1000]);
    }

    #[tokio::test]
    async fn test_discard_temps_cleans_interrupted_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let asset = image_asset(temp_dir.path());
        std::fs::write(temp_dir.path().join("temp_hero.webp"), b"partial").unwrap();

        Transcoder::discard_temps(&asset, &[VariantTag::DesktopWebp]).await;
        assert!(!temp_dir.path().join("temp_hero.webp").exists());
    }
}
