//! # Error Types Module
//!
//! Questo modulo definisce la tassonomia degli errori della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` per categorizzare ogni fallimento possibile
//! - Distingue gli errori locali al singolo asset da quelli fatali per il run
//! - Integra con `thiserror` per le conversioni automatiche da `io` e `image`
//!
//! ## Categorie di errori:
//! - `DirectoryNotFound`: root di scansione assente (non fatale, niente da fare)
//! - `EncodeFailure`: l'encoder esterno ha fallito per una variante
//! - `PartialWriteDetected`: file temporaneo senza segnale di successo
//! - `MetadataReadFailure`: dimensioni immagine non leggibili
//! - `Timeout`: l'asset ha superato il tempo massimo
//! - `MissingDependency`: tool esterno mancante (fatale all'avvio)
//! - `Config`: configurazione non valida (fatale all'avvio)
//!
//! ## Propagazione:
//! Tutti gli errori per-asset restano locali all'asset: il sequencer li
//! registra nel report e prosegue. Solo `MissingDependency` e `Config`
//! interrompono il processo.

use std::path::PathBuf;

/// Custom error types for the optimization pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Encode failed for {} ({variant}): {message}", .path.display())]
    EncodeFailure {
        path: PathBuf,
        variant: String,
        message: String,
    },

    #[error("Partial write detected: {}", .0.display())]
    PartialWriteDetected(PathBuf),

    #[error("Could not read image metadata for {}: {message}", .path.display())]
    MetadataReadFailure { path: PathBuf, message: String },

    #[error("Timed out after {seconds}s: {}", .path.display())]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl OptimizeError {
    /// Whether this error should stop the whole run instead of a single asset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingDependency(_) | Self::Config(_))
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, variant: impl ToString, message: impl ToString) -> Self {
        Self::EncodeFailure {
            path: path.into(),
            variant: variant.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizeError>;
