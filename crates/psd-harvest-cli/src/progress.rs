use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use psd_harvest_core::{Classification, Error, ProcessedOutput, ProgressReporter, Summary};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// CLI progress reporter using an indicatif spinner.
///
/// Candidates are discovered lazily, so there is no total to show a bar
/// against; the spinner carries running counts instead.
pub struct CliReporter {
    bar: ProgressBar,
    seen: AtomicUsize,
    extracted: AtomicUsize,
    failed: AtomicUsize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            seen: AtomicUsize::new(0),
            extracted: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn refresh(&self) {
        self.bar.set_message(format!(
            "{} files seen, {} extracted, {} failed",
            self.seen.load(Ordering::Relaxed),
            self.extracted.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        ));
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_started(&self, root: &Path) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_style(style);
        self.bar.set_message(format!("Scanning {}...", root.display()));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_file_classified(&self, _path: &Path, _outcome: &Classification) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn on_file_processed(&self, _path: &Path, _output: &ProcessedOutput) {
        self.extracted.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn on_extraction_failed(&self, path: &Path, reason: &Error) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.bar.println(format!("  {} {}: {}", "✗".red(), path.display(), reason));
        self.refresh();
    }

    fn on_run_summary(&self, summary: &Summary) {
        self.bar.finish_and_clear();
        eprintln!(
            "  {} Done: {} files in {:.2}s",
            "✓".green(),
            summary.total,
            summary.duration.as_secs_f64()
        );
    }
}
