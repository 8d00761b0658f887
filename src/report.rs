//! # Run Report Module
//!
//! Totali del run corrente, alimentati dagli eventi di completamento.
//!
//! ## Statistiche tracciate:
//! - **seen**: asset incontrati
//! - **processed** / **skipped** / **failed**: conteggi per stato terminale
//! - **original_bytes** / **output_bytes**: byte prima e dopo, solo per gli asset processati
//! - **failures**: path e messaggio di ogni fallimento
//!
//! Il report vive solo per la durata del processo: ogni invocazione riparte
//! da zero riscandendo il filesystem.

use crate::file_manager::{FileManager, MediaKind};
use crate::policy::{PolicyReason, VariantTag};
use crate::transcoder::DerivedArtifact;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Terminal state of one asset
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Skipped {
        reasons: BTreeSet<PolicyReason>,
    },
    /// Dry run: would have been processed
    Planned {
        original_bytes: u64,
        variants: Vec<VariantTag>,
    },
    Completed {
        original_bytes: u64,
        output_bytes: u64,
        artifacts: Vec<DerivedArtifact>,
    },
    Failed {
        error: String,
    },
}

/// One asset reaching a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub outcome: TaskOutcome,
}

impl CompletionEvent {
    pub fn file_name(&self) -> String {
        self.path.file_name().unwrap_or_default().to_string_lossy().into_owned()
    }

    /// Single progress line for this event
    pub fn progress_line(&self) -> String {
        let name = self.file_name();
        match &self.outcome {
            TaskOutcome::Skipped { reasons } => {
                let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                format!("⏭️  Skipped {} ({})", name, reasons.join(", "))
            }
            TaskOutcome::Planned { original_bytes, variants } => {
                let variants: Vec<&str> = variants.iter().map(|v| v.as_str()).collect();
                format!(
                    "📝 Would process {} ({}) -> {}",
                    name,
                    FileManager::format_size(*original_bytes),
                    variants.join(", ")
                )
            }
            TaskOutcome::Completed { original_bytes, output_bytes, artifacts } => {
                let parts: Vec<String> = artifacts
                    .iter()
                    .map(|a| format!("{} {}", a.variant, FileManager::format_size(a.size)))
                    .collect();
                format!(
                    "✅ {}: {} -> {} ({:.1}%) [{}]",
                    name,
                    FileManager::format_size(*original_bytes),
                    FileManager::format_size(*output_bytes),
                    FileManager::calculate_reduction(*original_bytes, *output_bytes),
                    parts.join(", ")
                )
            }
            TaskOutcome::Failed { error } => format!("❌ Error processing {}: {}", name, error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub error: String,
}

/// Process-scoped aggregate of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub seen: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub failures: Vec<FailureRecord>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run, ..Default::default() }
    }

    /// Fold one completion event into the totals
    pub fn record(&mut self, event: &CompletionEvent) {
        self.seen += 1;
        match &event.outcome {
            TaskOutcome::Skipped { .. } => self.skipped += 1,
            TaskOutcome::Planned { .. } => self.processed += 1,
            TaskOutcome::Completed { original_bytes, output_bytes, .. } => {
                self.processed += 1;
                self.original_bytes += original_bytes;
                self.output_bytes += output_bytes;
            }
            TaskOutcome::Failed { error } => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    path: event.path.clone(),
                    error: error.clone(),
                });
            }
        }
    }

    /// `(original - output) / original * 100`, 0 when nothing was processed
    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_bytes, self.output_bytes)
    }

    pub fn is_consistent(&self) -> bool {
        self.processed + self.skipped + self.failed == self.seen
    }

    pub fn format_summary(&self) -> String {
        let processed_label = if self.dry_run { "To process" } else { "Processed" };
        let mut lines = vec![
            format!("📊 Assets seen: {}", self.seen),
            format!(
                "   {}: {} | Skipped: {} | Failed: {}",
                processed_label, self.processed, self.skipped, self.failed
            ),
        ];
        if !self.dry_run {
            lines.push(format!("📊 Total original size: {}", FileManager::format_size(self.original_bytes)));
            lines.push(format!("📊 Total optimized size: {}", FileManager::format_size(self.output_bytes)));
            lines.push(format!("💾 Space saved: {:.1}%", self.reduction_percent()));
        }
        for failure in &self.failures {
            lines.push(format!("   ❌ {}: {}", failure.path.display(), failure.error));
        }
        lines.join("\n")
    }
}
