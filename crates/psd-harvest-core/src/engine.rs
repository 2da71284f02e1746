use crate::config::AppConfig;
use crate::dedup::{self, Classification};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::orchestrator::ExtractionOrchestrator;
use crate::progress::ProgressReporter;
use crate::scanner::{FileRecord, Scanner};
use crate::storage::StateStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Drives scan → classify → extract → persist, one file at a time.
pub struct BatchRunner<E> {
    config: AppConfig,
    extractor: E,
}

#[derive(Debug, Default, Clone)]
pub struct Summary {
    pub total: usize,
    pub new: usize,
    pub duplicate: usize,
    pub skipped: usize,
    pub failed: usize,
    /// (path, reason) for every per-file failure.
    pub failures: Vec<(PathBuf, String)>,
    /// Directory entries the scanner could not read.
    pub scan_warnings: usize,
    pub duration: Duration,
}

impl Summary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record_failure(&mut self, path: &Path, err: &Error) {
        self.failed += 1;
        self.failures.push((path.to_path_buf(), err.to_string()));
    }
}

impl<E: Extractor> BatchRunner<E> {
    pub fn new(config: AppConfig, extractor: E) -> Self {
        Self { config, extractor }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Process every candidate under `input_root` into `output_root`.
    ///
    /// A failing file is counted and the run moves on. Only structural
    /// problems and state store failures abort the run.
    pub fn run<S>(
        &self,
        input_root: &Path,
        output_root: &Path,
        state: &mut S,
        reporter: &dyn ProgressReporter,
    ) -> Result<Summary>
    where
        S: StateStore + ?Sized,
    {
        let start = Instant::now();
        prepare_roots(input_root, output_root)?;

        let scanner = self.scanner(input_root, output_root);
        let orchestrator = ExtractionOrchestrator::new(output_root, &self.extractor)
            .with_copy_source(self.config.copy_source);

        info!("Scanning for .{} files in: {}", self.config.extension, input_root.display());
        reporter.on_scan_started(input_root);

        let mut summary = Summary::default();
        let mut candidates = scanner.scan();

        for mut record in candidates.by_ref() {
            summary.total += 1;
            debug!("[{}] {}", summary.total, record.path.display());

            let classification = match dedup::classify(&mut record, &*state) {
                Ok(classification) => classification,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    fail(&mut summary, &record, &err, reporter);
                    continue;
                }
            };
            reporter.on_file_classified(&record.path, &classification);

            match classification {
                Classification::AlreadyProcessed => {
                    info!("Skipping already processed file: {}", record.path.display());
                    summary.skipped += 1;
                }
                Classification::Duplicate { base_name, .. } => {
                    info!(
                        "Duplicate detected (same hash): {} matches existing {}",
                        record.path.display(),
                        base_name
                    );
                    state.record_processed(&record.key())?;
                    summary.duplicate += 1;
                }
                Classification::New { fingerprint, .. } => {
                    info!("Processing: {}", record.path.display());
                    match orchestrator.process(&record.path, &fingerprint, &mut *state) {
                        Ok(output) => {
                            reporter.on_file_processed(&record.path, &output);
                            summary.new += 1;
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => fail(&mut summary, &record, &err, reporter),
                    }
                }
            }
        }

        summary.scan_warnings = candidates.warnings();
        summary.duration = start.elapsed();
        log_summary(&summary);
        reporter.on_run_summary(&summary);
        Ok(summary)
    }

    /// Classify every candidate against the stored state without copying,
    /// extracting or writing state. Each file is judged against the state as
    /// it is now, so identical new files both report as new.
    pub fn dry_run<S>(
        &self,
        input_root: &Path,
        output_root: &Path,
        state: &S,
        reporter: &dyn ProgressReporter,
    ) -> Result<Summary>
    where
        S: StateStore + ?Sized,
    {
        let start = Instant::now();
        if !input_root.is_dir() {
            return Err(Error::Structural(format!(
                "Input path is not a directory: {}",
                input_root.display()
            )));
        }

        reporter.on_scan_started(input_root);
        let scanner = self.scanner(input_root, output_root);
        let mut summary = Summary::default();
        let mut candidates = scanner.scan();

        for mut record in candidates.by_ref() {
            summary.total += 1;
            match dedup::classify(&mut record, state) {
                Ok(classification) => {
                    reporter.on_file_classified(&record.path, &classification);
                    match classification {
                        Classification::AlreadyProcessed => summary.skipped += 1,
                        Classification::Duplicate { .. } => summary.duplicate += 1,
                        Classification::New { .. } => summary.new += 1,
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => fail(&mut summary, &record, &err, reporter),
            }
        }

        summary.scan_warnings = candidates.warnings();
        summary.duration = start.elapsed();
        reporter.on_run_summary(&summary);
        Ok(summary)
    }

    fn scanner(&self, input_root: &Path, output_root: &Path) -> Scanner {
        Scanner::new(input_root, &self.config.extension)
            .with_ignore_patterns(&self.config.ignore_patterns)
            .exclude_dir(output_root)
    }
}

fn prepare_roots(input_root: &Path, output_root: &Path) -> Result<()> {
    if !input_root.exists() {
        return Err(Error::Structural(format!(
            "Input directory does not exist: {}",
            input_root.display()
        )));
    }
    if !input_root.is_dir() {
        return Err(Error::Structural(format!(
            "Input path is not a directory: {}",
            input_root.display()
        )));
    }
    fs::create_dir_all(output_root).map_err(|e| {
        Error::Structural(format!(
            "Cannot create output directory {}: {}",
            output_root.display(),
            e
        ))
    })
}

fn fail(summary: &mut Summary, record: &FileRecord, err: &Error, reporter: &dyn ProgressReporter) {
    error!("Failed to process {}: {}", record.path.display(), err);
    summary.record_failure(&record.path, err);
    reporter.on_extraction_failed(&record.path, err);
}

fn log_summary(summary: &Summary) {
    info!("Processing Summary:");
    info!("Total files found: {}", summary.total);
    info!("Newly extracted: {}", summary.new);
    info!("Duplicates (same content): {}", summary.duplicate);
    info!("Already processed (skipped): {}", summary.skipped);
    info!("Failed: {}", summary.failed);
    debug!(
        "Run completed in {:.2}s with {} scan warnings",
        summary.duration.as_secs_f64(),
        summary.scan_warnings
    );
}
