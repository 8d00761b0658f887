//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore principale che delega responsabilità ai moduli specializzati.
//!
//! ## Flusso di un run:
//! 1. Pulizia dei `temp_*` rimasti da run interrotti
//! 2. Enumerazione statica dei file candidati per lo stage richiesto
//! 3. Verifica dei tool necessari (solo se c'è qualcosa da fare)
//! 4. Elaborazione con pool di worker limitato da semaforo
//! 5. Riepilogo finale (testo o JSON)

use crate::{
    config::Config,
    encoder::{Capability, MediaEncoder},
    file_manager::{FileManager, ANALYZE_VIDEO_EXTENSIONS, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS},
    json_output::{JsonConfig, JsonMessage},
    optimizer::{progress_tracker::ProgressTracker, task_optimizer::TaskOptimizer},
    policy::TaskKind,
    progress::ProgressManager,
    report::{CompletionEvent, RunReport},
    transcoder::Transcoder,
};
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Which part of the library a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Videos first, then images
    All,
    Videos,
    Images,
    /// Poster frames for every video in both roots
    Thumbnails,
    /// Dry run of `All`, also counting videos that are never re-encoded
    Analyze,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Videos => "videos",
            Self::Images => "images",
            Self::Thumbnails => "thumbnails",
            Self::Analyze => "analyze",
        }
    }

    pub fn task(&self) -> TaskKind {
        match self {
            Self::Thumbnails => TaskKind::Thumbnail,
            _ => TaskKind::Optimize,
        }
    }

    /// Roots to walk, in order, with the extensions accepted under each
    fn sources(&self, config: &Config) -> Vec<(PathBuf, &'static [&'static str])> {
        match self {
            Self::All => vec![
                (config.video_root(), VIDEO_EXTENSIONS),
                (config.image_root(), IMAGE_EXTENSIONS),
            ],
            Self::Videos => vec![(config.video_root(), VIDEO_EXTENSIONS)],
            Self::Images => vec![(config.image_root(), IMAGE_EXTENSIONS)],
            Self::Thumbnails => vec![
                (config.video_root(), VIDEO_EXTENSIONS),
                (config.image_root(), VIDEO_EXTENSIONS),
            ],
            Self::Analyze => vec![
                (config.video_root(), ANALYZE_VIDEO_EXTENSIONS),
                (config.image_root(), IMAGE_EXTENSIONS),
            ],
        }
    }
}

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Arc<Config>,
    encoder: Arc<dyn MediaEncoder>,
}

impl MediaOptimizer {
    /// Crea nuova istanza dell'ottimizzatore
    pub fn new(config: Config, encoder: Arc<dyn MediaEncoder>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            encoder,
        })
    }

    /// Esegue lo stage richiesto e restituisce il report del run
    pub async fn run(&self, stage: Stage) -> Result<RunReport> {
        let start_time = Instant::now();
        let config = self.config_for(stage);
        let sources = stage.sources(&config);

        if !config.dry_run {
            self.sweep_temp_files(&sources).await;
        }

        let files = Self::enumerate(&sources);
        let roots: Vec<PathBuf> = sources.iter().map(|(root, _)| root.clone()).collect();

        if files.is_empty() {
            info!("No candidate files found under {:?}", roots);
            let report = RunReport::new(config.dry_run);
            Self::print_final_stats(&config, stage, &report, start_time);
            return Ok(report);
        }

        if !config.dry_run {
            let needs = Self::required_capabilities(stage, &files);
            self.encoder.ensure_available(&needs)?;
        }

        if config.json_output {
            JsonMessage::Start {
                stage: stage.name(),
                roots,
                total_files: files.len(),
                config: JsonConfig::from(config.as_ref()),
            }
            .emit();
        } else {
            Self::log_configuration(&config, stage, files.len());
        }

        let report = self.process_files(&config, stage, files).await?;
        Self::print_final_stats(&config, stage, &report, start_time);
        Ok(report)
    }

    /// `Analyze` never writes, whatever the configuration says
    fn config_for(&self, stage: Stage) -> Arc<Config> {
        if stage == Stage::Analyze && !self.config.dry_run {
            Arc::new(Config {
                dry_run: true,
                ..self.config.as_ref().clone()
            })
        } else {
            self.config.clone()
        }
    }

    /// Remove leftovers of interrupted runs from every root of the stage
    async fn sweep_temp_files(&self, sources: &[(PathBuf, &'static [&'static str])]) {
        let mut swept = HashSet::new();
        for (root, _) in sources {
            if swept.insert(root.clone()) {
                let removed = FileManager::sweep_stale_temp_files(root).await;
                if removed > 0 {
                    warn!("🧹 Removed {} stale temp files under {}", removed, root.display());
                }
            }
        }
    }

    /// Static candidate list; a path reachable from two roots appears once
    fn enumerate(sources: &[(PathBuf, &'static [&'static str])]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for (root, extensions) in sources {
            for path in FileManager::find_media_files(root, extensions) {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }
        files
    }

    fn required_capabilities(stage: Stage, files: &[PathBuf]) -> Vec<Capability> {
        if stage == Stage::Thumbnails {
            return vec![Capability::Thumbnail];
        }
        let mut needs = Vec::new();
        if files.iter().any(|p| FileManager::is_video(p)) {
            needs.push(Capability::Video);
        }
        if files.iter().any(|p| FileManager::is_image(p)) {
            needs.push(Capability::Image);
        }
        needs
    }

    /// Logga configurazione (solo se non JSON mode)
    fn log_configuration(config: &Config, stage: Stage, total: usize) {
        info!("Starting {} optimization in: {}", stage.name(), config.project_root.display());
        if matches!(stage, Stage::All | Stage::Videos | Stage::Analyze) {
            info!(
                "Video: threshold {}, CRF {}, preset {}, audio {}",
                FileManager::format_size(config.video_size_threshold),
                config.desktop_crf,
                config.video_preset,
                config.audio_bitrate
            );
        }
        if matches!(stage, Stage::All | Stage::Images | Stage::Analyze) {
            info!(
                "Images: WebP q{} / mobile q{} at {}px, fallback JPEG q{}",
                config.webp_quality, config.mobile_webp_quality, config.image_mobile_width, config.fallback_jpeg_quality
            );
        }
        if config.dry_run {
            info!("Dry run mode: No files will be modified");
        }
        info!("Found {} media files, {} worker(s)", total, config.effective_workers());
    }

    /// Pool di worker limitato; il tracker è l'unico a toccare il report
    async fn process_files(&self, config: &Arc<Config>, stage: Stage, files: Vec<PathBuf>) -> Result<RunReport> {
        let quiet = config.json_output;
        let progress = ProgressManager::new(files.len() as u64, quiet);
        let tracker = ProgressTracker::new(config.dry_run, progress.clone(), quiet);

        let workers = config.effective_workers();
        let (tx, rx) = mpsc::channel::<CompletionEvent>(workers * 2);
        let aggregator = tokio::spawn(tracker.run(rx));

        let transcoder = Transcoder::new(self.encoder.clone(), config.clone());
        let task_optimizer = TaskOptimizer::new(config.clone(), transcoder, stage.task());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = Vec::with_capacity(files.len());

        for path in files {
            let permit = semaphore.clone().acquire_owned().await?;
            let worker = task_optimizer.clone();
            let tx = tx.clone();
            let progress = progress.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                if let Some(name) = path.file_name() {
                    progress.set_message(&name.to_string_lossy());
                }
                let event = worker.process(path).await;
                if tx.send(event).await.is_err() {
                    debug!("Aggregator closed before all events were delivered");
                }
            }));
        }
        drop(tx);

        for result in futures::future::join_all(tasks).await {
            result?;
        }
        let report = aggregator.await?;
        progress.finish();

        debug_assert!(report.is_consistent());
        Ok(report)
    }

    /// Stampa statistiche finali
    fn print_final_stats(config: &Config, stage: Stage, report: &RunReport, start_time: Instant) {
        let duration = start_time.elapsed().as_secs_f64();
        if config.json_output {
            JsonMessage::complete(stage.name(), report, duration).emit();
        } else {
            println!("{}", report.format_summary());
            info!("=== {} complete in {:.1}s ===", stage.name(), duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sources() {
        let config = Config::default();
        let all = Stage::All.sources(&config);
        assert_eq!(all[0].0, config.video_root());
        assert_eq!(all[1].1, IMAGE_EXTENSIONS);

        let thumbs = Stage::Thumbnails.sources(&config);
        assert!(thumbs.iter().all(|(_, exts)| *exts == VIDEO_EXTENSIONS));
        assert_eq!(Stage::Thumbnails.task(), TaskKind::Thumbnail);

        let analyze = Stage::Analyze.sources(&config);
        assert_eq!(analyze[0].1, ANALYZE_VIDEO_EXTENSIONS);
        assert_eq!(Stage::Analyze.task(), TaskKind::Optimize);
    }

    #[test]
    fn test_required_capabilities_follow_candidates() {
        let files = vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")];
        assert_eq!(MediaOptimizer::required_capabilities(Stage::All, &files), vec![Capability::Image]);

        let files = vec![PathBuf::from("a.mp4")];
        assert_eq!(
            MediaOptimizer::required_capabilities(Stage::Thumbnails, &files),
            vec![Capability::Thumbnail]
        );
    }
}
