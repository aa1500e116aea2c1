//! Progress reporting for CLI

use crate::domain::entities::ScanProgress;
use crate::domain::repositories::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Progress reporter using indicatif
pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

impl ProgressReporter {
    /// Creates a bar over `slots_total` metadata slots
    pub fn for_scan(slots_total: u64) -> Self {
        let bar = ProgressBar::new(slots_total);
        let style = ProgressStyle::with_template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} slots ({eta})",
        )
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("Parsing filesystem metadata...");

        Self { bar: Arc::new(bar) }
    }

    /// Creates a reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: Arc::new(ProgressBar::hidden()),
        }
    }

    /// Clears the bar from the terminal
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Gets a callback for parse progress
    pub fn scan_callback(&self) -> ProgressCallback {
        let bar = Arc::clone(&self.bar);
        Box::new(move |progress: &ScanProgress| {
            if bar.length() != Some(progress.slots_total) {
                bar.set_length(progress.slots_total);
            }
            bar.set_position(progress.slots_done);
            bar.set_message(format!(
                "Found {} records | {} deleted",
                progress.found, progress.deleted
            ));
        })
    }
}
