//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei media e le operazioni sicure sui file.
//!
//! ## Responsabilità:
//! - Discovery lazy (a stack esplicito, via `walkdir`) dei file sotto una root
//! - Filtro per estensione ed esclusione degli artefatti già derivati
//! - Pulizia dei soli `temp_*` che la pipeline stessa produce, lasciati da un
//!   run interrotto (un sorgente che inizia per `temp_` resta dov'è)
//! - Promozione atomica temp → destinazione (verifica, fsync, rename)
//! - Utilità per dimensioni e percentuali di riduzione
//!
//! ## Formati considerati:
//! - **Immagini**: JPG, JPEG, PNG
//! - **Video**: MP4 (WebM solo conteggiato dall'analisi, mai ricodificato)
//!
//! ## Esempio:
//! ```rust,ignore
//! for path in MediaWalker::new(&root, IMAGE_EXTENSIONS) {
//!     // una sola volta per path, in ordine depth-first
//! }
//! ```

use crate::error::OptimizeError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];
/// Videos counted by the analysis but never re-encoded.
pub const REPORT_ONLY_VIDEO_EXTENSIONS: &[&str] = &["webm"];
pub const ANALYZE_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm"];

/// Prefix of in-flight encoder outputs, next to their final destination.
pub const TEMP_PREFIX: &str = "temp_";
/// Stem suffix of mobile variants.
pub const MOBILE_SUFFIX: &str = "-mobile";
/// Stem suffix of video poster frames.
pub const THUMB_SUFFIX: &str = "_thumb";

/// Kind of a source asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        if FileManager::is_video(path) || FileManager::is_report_only_video(path) {
            Some(Self::Video)
        } else if FileManager::is_image(path) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// Lazy, finite sequence of candidate files under a root.
///
/// Depth-first, a directory's entries sorted by name, each path yielded once.
/// A missing root yields nothing. Not restartable once exhausted.
pub struct MediaWalker {
    inner: Option<walkdir::IntoIter>,
    extensions: Vec<String>,
}

impl MediaWalker {
    pub fn new(root: &Path, extensions: &[&str]) -> Self {
        let inner = if root.is_dir() {
            Some(WalkDir::new(root).sort_by_file_name().into_iter())
        } else {
            info!("{}", OptimizeError::DirectoryNotFound(root.to_path_buf()));
            None
        };

        Self {
            inner,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if FileManager::is_derived_artifact(path) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        FileManager::extension_of(path)
            .map(|ext| self.extensions.iter().any(|e| *e == ext))
            .unwrap_or(false)
    }
}

impl Iterator for MediaWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.inner.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() && self.accepts(entry.path()) {
                return Some(entry.into_path());
            }
        }
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all candidate files of the given extensions under `root`
    pub fn find_media_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
        MediaWalker::new(root, extensions).collect()
    }

    /// Lower-cased extension of a path
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Check if a file is an image
    pub fn is_image(path: &Path) -> bool {
        Self::extension_of(path)
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Check if a file is a video
    pub fn is_video(path: &Path) -> bool {
        Self::extension_of(path)
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Video container the pipeline inspects but does not transcode
    pub fn is_report_only_video(path: &Path) -> bool {
        Self::extension_of(path)
            .map(|ext| REPORT_ONLY_VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Files this tool produces itself and must never treat as sources
    pub fn is_derived_artifact(path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        name.starts_with(TEMP_PREFIX) || stem.ends_with(MOBILE_SUFFIX) || stem.ends_with(THUMB_SUFFIX)
    }

    /// Whether `path` holds a usable artifact (exists, regular file, non-empty)
    pub fn is_valid_artifact(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Temporary sibling path an encoder writes to before promotion
    pub fn temp_path_for(dest: &Path) -> PathBuf {
        let name = dest.file_name().unwrap_or_default().to_string_lossy();
        dest.with_file_name(format!("{}{}", TEMP_PREFIX, name))
    }

    /// Whether `path` is an in-flight output of this tool.
    ///
    /// Only names a variant could have are matched: `temp_<stem>.webp`,
    /// `temp_<stem>-mobile.*`, `temp_<stem>_thumb.jpg`, or a temp video whose
    /// source sits next to it. Any other `temp_*` file is left alone.
    pub fn is_stale_temp(path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let target = match name.strip_prefix(TEMP_PREFIX) {
            Some(target) => path.with_file_name(target),
            None => return false,
        };
        let stem = target.file_stem().unwrap_or_default().to_string_lossy();
        let ext = Self::extension_of(&target);

        match ext.as_deref() {
            Some("webp") => true,
            Some("jpg") if stem.ends_with(THUMB_SUFFIX) => true,
            _ if stem.ends_with(MOBILE_SUFFIX) => true,
            _ => Self::is_video(&target) && target.is_file(),
        }
    }

    /// Remove in-flight outputs left behind by an interrupted run
    pub async fn sweep_stale_temp_files(root: &Path) -> usize {
        if !root.is_dir() {
            return 0;
        }

        let stale: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| Self::is_stale_temp(e.path()))
            .map(|e| e.into_path())
            .collect();

        let mut removed = 0;
        for path in stale {
            warn!("{} - removing", OptimizeError::PartialWriteDetected(path.clone()));
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale temp file {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Promote a finished temp output over its destination.
    ///
    /// The temp file must exist and be non-empty; it is flushed to disk and
    /// then renamed over `dest` in one step, so readers see either the old
    /// file or the complete new one.
    pub async fn promote(temp: &Path, dest: &Path) -> Result<(), OptimizeError> {
        if !Self::is_valid_artifact(temp) {
            let _ = fs::remove_file(temp).await;
            return Err(OptimizeError::PartialWriteDetected(temp.to_path_buf()));
        }

        fs::File::open(temp).await?.sync_all().await?;
        fs::rename(temp, dest).await?;
        debug!("Promoted {} -> {}", temp.display(), dest.display());
        Ok(())
    }

    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64, OptimizeError> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
