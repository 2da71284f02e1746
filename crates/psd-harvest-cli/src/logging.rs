use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "psd_harvest.log";

/// Log file: `LOG_FILE_PATH`, else `psd_harvest.log` in the output root of the
/// command, else in the working directory.
pub fn log_file_path(output_root: Option<&Path>) -> PathBuf {
    match env::var_os("LOG_FILE_PATH") {
        Some(path) => PathBuf::from(path),
        None => output_root
            .map(|root| root.join(LOG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME)),
    }
}

/// Pretty stdout plus a plain file layer. Keep the guard alive for the whole
/// program or buffered file lines are lost.
pub fn init_logger(verbose: bool, output_root: Option<&Path>) -> Result<WorkerGuard> {
    let filter = if verbose {
        "debug".to_string()
    } else {
        env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string())
    };

    let log_file = log_file_path(output_root);
    let log_dir = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", log_file.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(log_dir)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(EnvFilter::new(filter))
        .init();

    info!("Logging to stdout and {}", log_file.display());

    Ok(guard)
}
