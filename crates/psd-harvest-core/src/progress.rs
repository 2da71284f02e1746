use crate::dedup::Classification;
use crate::engine::Summary;
use crate::error::Error;
use crate::orchestrator::ProcessedOutput;
use std::path::Path;

/// Trait for reporting batch events.
///
/// CLI implements with indicatif; tests usually pass [`SilentReporter`].
/// Events are fire-and-forget and never influence the run.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_started(&self, _root: &Path) {}
    fn on_file_classified(&self, _path: &Path, _outcome: &Classification) {}
    fn on_file_processed(&self, _path: &Path, _output: &ProcessedOutput) {}
    fn on_extraction_failed(&self, _path: &Path, _reason: &Error) {}
    fn on_run_summary(&self, _summary: &Summary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
