//! # Progress Reporting Module
//!
//! Questo modulo gestisce il feedback visivo durante il run.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif` (su stderr, nascosta se non è un terminale)
//! - Righe di progresso per file su stdout, stampate sopra la barra
//! - Modalità silenziosa quando l'output è JSON
//!
//! ## Visual feedback:
//! ```text
//! ⏭️  Skipped intro.mp4 (already small enough)
//! ✅ hero.png: 2.10 MB -> 640.00 KB (70.2%) [desktop-webp 410.00 KB, ...]
//! ⠋ [00:00:12] [=========>------------------------------] 3/12 (25%) hero.png
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    quiet: bool,
}

impl ProgressManager {
    /// Create a new progress manager; `quiet` suppresses both bar and lines
    pub fn new(total_files: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_files)
        };

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        if !quiet {
            bar.enable_steady_tick(Duration::from_millis(100));
        }

        Self { bar, quiet }
    }

    /// Progress manager that never draws, for tests and JSON mode
    pub fn hidden() -> Self {
        Self::new(0, true)
    }

    /// Print a line to stdout without tearing the bar
    pub fn println(&self, line: &str) {
        if !self.quiet {
            self.bar.suspend(|| println!("{}", line));
        }
    }

    /// Show which file is in flight
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Count one finished asset
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_manager_is_silent() {
        let progress = ProgressManager::hidden();
        progress.set_message("clip.mp4");
        progress.advance();
        progress.println("never shown");
        progress.finish();
    }
}
