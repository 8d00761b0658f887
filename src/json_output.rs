//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato (JSON Lines) per l'integrazione CI.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio del run (root, numero di asset, configurazione)
//! - `file_complete`: un asset ha raggiunto uno stato terminale
//! - `complete`: riepilogo finale, un solo oggetto per run
//! - `error`: errore fatale (tool mancante, configurazione non valida)

use crate::config::Config;
use crate::report::{CompletionEvent, RunReport};
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage<'a> {
    Start {
        stage: &'a str,
        roots: Vec<PathBuf>,
        total_files: usize,
        config: JsonConfig,
    },
    FileComplete {
        #[serde(flatten)]
        event: &'a CompletionEvent,
    },
    Complete {
        stage: &'a str,
        #[serde(flatten)]
        report: &'a RunReport,
        reduction_percent: f64,
        duration_seconds: f64,
    },
    Error {
        message: String,
    },
}

/// Configurazione riportata nel messaggio `start`
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub video_size_threshold: u64,
    pub desktop_crf: u8,
    pub image_mobile_width: u32,
    pub webp_quality: u8,
    pub mobile_webp_quality: u8,
    pub fallback_jpeg_quality: u8,
    pub tiny_file_floor: u64,
    pub workers: usize,
    pub dry_run: bool,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            video_size_threshold: config.video_size_threshold,
            desktop_crf: config.desktop_crf,
            image_mobile_width: config.image_mobile_width,
            webp_quality: config.webp_quality,
            mobile_webp_quality: config.mobile_webp_quality,
            fallback_jpeg_quality: config.fallback_jpeg_quality,
            tiny_file_floor: config.tiny_file_floor,
            workers: config.workers,
            dry_run: config.dry_run,
        }
    }
}

impl<'a> JsonMessage<'a> {
    pub fn complete(stage: &'a str, report: &'a RunReport, duration_seconds: f64) -> Self {
        Self::Complete {
            stage,
            report,
            reduction_percent: report.reduction_percent(),
            duration_seconds,
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"type":"error","message":"{}"}}"#, e))
    }

    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        println!("{}", self.to_line());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::MediaKind;
    use crate::report::TaskOutcome;
    use serde_json::Value;

    #[test]
    fn test_file_complete_is_flat() {
        let event = CompletionEvent {
            path: PathBuf::from("/m/clip.mp4"),
            kind: MediaKind::Video,
            outcome: TaskOutcome::Failed { error: "boom".into() },
        };
        let value: Value = serde_json::from_str(&JsonMessage::FileComplete { event: &event }.to_line()).unwrap();
        assert_eq!(value["type"], "file_complete");
        assert_eq!(value["kind"], "video");
        assert_eq!(value["outcome"]["status"], "failed");
    }

    #[test]
    fn test_complete_carries_summary() {
        let report = RunReport {
            seen: 3,
            processed: 1,
            skipped: 1,
            failed: 1,
            original_bytes: 100,
            output_bytes: 25,
            ..Default::default()
        };
        let value: Value = serde_json::from_str(&JsonMessage::complete("all", &report, 1.5).to_line()).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["seen"], 3);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["reduction_percent"], 75.0);
    }

    #[test]
    fn test_start_reports_config() {
        let config = Config::default();
        let msg = JsonMessage::Start {
            stage: "images",
            roots: vec![config.image_root()],
            total_files: 4,
            config: JsonConfig::from(&config),
        };
        let value: Value = serde_json::from_str(&msg.to_line()).unwrap();
        assert_eq!(value["config"]["image_mobile_width"], 800);
        assert_eq!(value["total_files"], 4);
    }
}
