//! # Progress Tracking Module
//!
//! Unico punto che aggiorna il `RunReport`: i worker inviano eventi di
//! completamento su un canale e il tracker li consuma in ordine di arrivo.
//! Gestisce sia output JSON che progress bar tradizionale.

use crate::{
    json_output::JsonMessage,
    progress::ProgressManager,
    report::{CompletionEvent, RunReport},
};
use tokio::sync::mpsc;

/// Aggregatore degli eventi di completamento
pub struct ProgressTracker {
    report: RunReport,
    progress: ProgressManager,
    json_output: bool,
}

impl ProgressTracker {
    pub fn new(dry_run: bool, progress: ProgressManager, json_output: bool) -> Self {
        Self {
            report: RunReport::new(dry_run),
            progress,
            json_output,
        }
    }

    /// Fold one event into the report and print its progress line
    pub fn handle_event(&mut self, event: &CompletionEvent) {
        self.report.record(event);

        if self.json_output {
            JsonMessage::FileComplete { event }.emit();
        } else {
            self.progress.println(&event.progress_line());
        }
        self.progress.advance();
    }

    /// Consume events until every sender is dropped, then hand back the totals
    pub async fn run(mut self, mut events: mpsc::Receiver<CompletionEvent>) -> RunReport {
        while let Some(event) = events.recv().await {
            self.handle_event(&event);
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::MediaKind;
    use crate::report::TaskOutcome;
    use std::path::PathBuf;

    fn event(name: &str, outcome: TaskOutcome) -> CompletionEvent {
        CompletionEvent {
            path: PathBuf::from(name),
            kind: MediaKind::Image,
            outcome,
        }
    }

    #[tokio::test]
    async fn test_aggregates_until_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        let tracker = ProgressTracker::new(false, ProgressManager::hidden(), false);
        let handle = tokio::spawn(tracker.run(rx));

        for i in 0..3 {
            let outcome = if i == 1 {
                TaskOutcome::Failed { error: "bad header".into() }
            } else {
                TaskOutcome::Completed { original_bytes: 100, output_bytes: 30, artifacts: Vec::new() }
            };
            tx.send(event(&format!("{}.png", i), outcome)).await.unwrap();
        }
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.seen, 3);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.original_bytes, 200);
        assert!(report.is_consistent());
    }

    #[test]
    fn test_handle_event_in_json_mode() {
        let mut tracker = ProgressTracker::new(true, ProgressManager::hidden(), true);
        tracker.handle_event(&event(
            "a.png",
            TaskOutcome::Planned { original_bytes: 10, variants: Vec::new() },
        ));
        assert_eq!(tracker.report.processed, 1);
        assert!(tracker.report.dry_run);
    }
}
