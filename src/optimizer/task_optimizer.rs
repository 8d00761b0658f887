//! # Task Optimizer Module
//!
//! Worker per l'elaborazione di un singolo asset.
//! Porta l'asset attraverso la macchina a stati
//! `Pending → Evaluating → (Skipped | Processing) → (Completed | Failed)`
//! e restituisce sempre un evento di completamento: nessun errore per-asset
//! risale al chiamante.

use crate::{
    config::Config,
    error::OptimizeError,
    file_manager::{FileManager, MediaKind},
    policy::{self, MediaAsset, OptimizationPolicy, TaskKind, VariantTag},
    report::{CompletionEvent, TaskOutcome},
    transcoder::Transcoder,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle of one asset within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    Pending,
    Evaluating,
    Skipped,
    Processing,
    Completed,
    Failed,
}

impl AssetState {
    /// Legal edges of the per-asset state machine. Terminal states have none.
    pub fn can_transition_to(&self, next: AssetState) -> bool {
        use AssetState::*;
        matches!(
            (self, next),
            (Pending, Evaluating)
                | (Evaluating, Skipped)
                | (Evaluating, Processing)
                | (Evaluating, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

/// Tracks the state of the asset being worked on
struct AssetTracker<'a> {
    path: &'a Path,
    state: AssetState,
}

impl<'a> AssetTracker<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, state: AssetState::Pending }
    }

    fn advance(&mut self, next: AssetState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.path.display(), self.state, next);
        self.state = next;
    }
}

/// Worker per elaborazione singoli file
#[derive(Clone)]
pub struct TaskOptimizer {
    config: Arc<Config>,
    transcoder: Transcoder,
    task: TaskKind,
}

impl TaskOptimizer {
    pub fn new(config: Arc<Config>, transcoder: Transcoder, task: TaskKind) -> Self {
        Self { config, transcoder, task }
    }

    /// Process one asset under its timeout; always yields an event
    pub async fn process(&self, path: PathBuf) -> CompletionEvent {
        let kind = MediaKind::from_path(&path).unwrap_or(MediaKind::Image);
        let limit = match kind {
            MediaKind::Video => self.config.video_timeout(),
            MediaKind::Image => self.config.image_timeout(),
        };

        // The timed-out run is dropped here, before its temps are discarded.
        let result = tokio::time::timeout(limit, self.run(&path)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = OptimizeError::Timeout {
                    path: path.clone(),
                    seconds: limit.as_secs(),
                };
                error!("❌ {}", err);
                let asset = MediaAsset::new(path.clone(), 0, kind);
                Transcoder::discard_temps(&asset, &VariantTag::ALL).await;
                TaskOutcome::Failed { error: err.to_string() }
            }
        };

        CompletionEvent { path, kind, outcome }
    }

    async fn run(&self, path: &Path) -> TaskOutcome {
        let mut tracker = AssetTracker::new(path);
        tracker.advance(AssetState::Evaluating);

        let (asset, policy) = match self.evaluate(path).await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                tracker.advance(AssetState::Failed);
                error!("❌ Error processing {}: {}", path.display(), e);
                return TaskOutcome::Failed { error: e.to_string() };
            }
        };

        if !policy.should_process {
            tracker.advance(AssetState::Skipped);
            debug!("Skipping {} ({})", asset.file_name(), policy.describe_reasons());
            return TaskOutcome::Skipped { reasons: policy.reasons };
        }

        tracker.advance(AssetState::Processing);

        if self.config.dry_run {
            tracker.advance(AssetState::Completed);
            return TaskOutcome::Planned {
                original_bytes: asset.size,
                variants: policy.target_variants,
            };
        }

        info!(
            "⏳ Processing {} ({}) - {}",
            asset.file_name(),
            FileManager::format_size(asset.size),
            policy.describe_reasons()
        );

        match self.transcoder.apply(&asset, &policy.target_variants).await {
            Ok(artifacts) => {
                tracker.advance(AssetState::Completed);
                let original_bytes = match self.task {
                    TaskKind::Optimize => asset.size,
                    TaskKind::Thumbnail => 0,
                };
                TaskOutcome::Completed {
                    original_bytes,
                    output_bytes: artifacts.iter().map(|a| a.size).sum(),
                    artifacts,
                }
            }
            Err(e) => {
                tracker.advance(AssetState::Failed);
                error!("❌ Error processing {}: {}", asset.file_name(), e);
                TaskOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Stat the asset, read image dimensions when they matter, apply the policy
    async fn evaluate(&self, path: &Path) -> Result<(MediaAsset, OptimizationPolicy), OptimizeError> {
        let mut asset = MediaAsset::discover(path).await?;

        let needs_dimensions = self.task == TaskKind::Optimize
            && asset.kind == MediaKind::Image
            && asset.size > self.config.tiny_file_floor;
        if needs_dimensions {
            let (width, height) = asset.probe_dimensions()?;
            debug!("{}: {}x{}", asset.file_name(), width, height);
        }

        let policy = policy::evaluate(&asset, &self.config, self.task);
        Ok((asset, policy))
    }
}
