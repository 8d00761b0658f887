//! # Portfolio Media Optimizer Library
//!
//! Pipeline batch che comprime i video e genera le varianti responsive
//! delle immagini di un sito portfolio.
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per diverse operazioni
//! - `file_manager`: Discovery dei media, pulizia temp, promozione atomica
//! - `policy`: Decisione per asset (processare o saltare, quali varianti)
//! - `tools`: Ricerca degli eseguibili esterni (ffmpeg, cwebp)
//! - `encoder`: Seam verso i codec esterni
//! - `transcoder`: Scrittura delle varianti con disciplina swap-on-success
//! - `report`: Eventi di completamento e totali del run
//! - `optimizer`: Orchestratore, worker e aggregatore
//! - `progress` / `json_output`: Output per terminale e per CI
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use portfolio_media_optimizer::{Config, ExternalEncoder, MediaOptimizer, Stage, ToolResolver};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let encoder = Arc::new(ExternalEncoder::new(ToolResolver::from_env()));
//! let optimizer = MediaOptimizer::new(Config::default(), encoder)?;
//! let report = optimizer.run(Stage::All).await?;
//! println!("{}", report.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod policy;
pub mod progress;
pub mod report;
pub mod tools;
pub mod transcoder;

pub use config::Config;
pub use encoder::{Capability, ExternalEncoder, MediaEncoder, VideoProfile};
pub use error::OptimizeError;
pub use optimizer::{MediaOptimizer, Stage};
pub use policy::{MediaAsset, OptimizationPolicy, PolicyReason, TaskKind, VariantTag};
pub use report::{CompletionEvent, RunReport, TaskOutcome};
pub use tools::ToolResolver;
pub use transcoder::{DerivedArtifact, Transcoder};
