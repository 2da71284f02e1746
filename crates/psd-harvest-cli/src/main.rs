mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ListArgs, ResetArgs, RunArgs, StateArgs};
use dotenv::dotenv;
use progress::CliReporter;
use psd_harvest_core::storage::MemoryStateStore;
use psd_harvest_core::{open_state_store, AppConfig, BatchRunner, PsdExtractor, StateStore, Summary};
use tracing::{error, info};

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_FILE_FAILURES: u8 = 2;

fn main() -> ExitCode {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = match logging::init_logger(args.verbose, output_root(&args.command)) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error setting up logging: {:#}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let config = match psd_harvest_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let outcome = match args.command {
        Some(Commands::Run(run_args)) => run(config, &run_args),
        Some(Commands::List(list_args)) => list(config, &list_args),
        Some(Commands::Status(state_args)) => status(&config, &state_args),
        Some(Commands::Reset(reset_args)) => reset(&config, &reset_args),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(EXIT_OK)
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(EXIT_OK)
        }
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("Error: {:#}", err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Output root for the log file. Read-only commands log to the working
/// directory so they never create the output root.
fn output_root(command: &Option<Commands>) -> Option<&Path> {
    match command.as_ref()? {
        Commands::Run(args) => Some(args.output.as_path()),
        Commands::Reset(args) => Some(args.output.as_path()),
        Commands::List(_) | Commands::Status(_) | Commands::PrintConfig => None,
    }
}

fn run(mut config: AppConfig, args: &RunArgs) -> Result<u8> {
    if args.no_copy {
        config.copy_source = false;
    }
    let state_path = config.state_file_path(&args.output, args.state_file.as_deref());
    let mut state = open_state_store(&state_path, args.reset)
        .with_context(|| format!("opening state at {}", state_path.display()))?;
    info!("Using state file: {}", state_path.display());

    let extractor = PsdExtractor::new().include_hidden(args.include_hidden);
    let runner = BatchRunner::new(config, extractor);
    let reporter = CliReporter::new();
    let summary = runner.run(&args.input, &args.output, state.as_mut(), &reporter)?;

    print_summary(&summary);
    Ok(exit_code(&summary))
}

fn list(config: AppConfig, args: &ListArgs) -> Result<u8> {
    let state_path = config.state_file_path(&args.output, args.state_file.as_deref());
    let state = open_existing_state(&state_path)?;

    let runner = BatchRunner::new(config, PsdExtractor::new());
    let reporter = ListReporter;
    let summary = runner.dry_run(&args.input, &args.output, &*state, &reporter)?;

    println!();
    println!(
        "{} would be extracted, {} duplicates, {} already processed, {} unreadable",
        format!("{}", summary.new).green(),
        format!("{}", summary.duplicate).yellow(),
        format!("{}", summary.skipped).cyan(),
        format!("{}", summary.failed).red(),
    );
    Ok(exit_code(&summary))
}

fn status(config: &AppConfig, args: &StateArgs) -> Result<u8> {
    let state_path = config.state_file_path(&args.output, args.state_file.as_deref());
    if !state_path.exists() {
        println!("No state file at {}", state_path.display());
        return Ok(EXIT_OK);
    }
    let state = open_existing_state(&state_path)?;
    let counts = state.counts()?;

    println!("State file: {}", state_path.display());
    println!("  processed paths: {}", format!("{}", counts.processed_paths).cyan());
    println!("  fingerprints:    {}", format!("{}", counts.fingerprints).cyan());
    println!("  extracted:       {}", format!("{}", counts.extracted).green());
    let pending = counts.fingerprints.saturating_sub(counts.extracted);
    if pending > 0 {
        println!(
            "  {} copied but not yet extracted; the next run retries them",
            format!("{}", pending).yellow()
        );
    }
    Ok(EXIT_OK)
}

fn reset(config: &AppConfig, args: &ResetArgs) -> Result<u8> {
    let state_path = config.state_file_path(&args.output, args.state_file.as_deref());
    let confirmed = args.yes
        || confirm(&format!(
            "Clear all processing state in {}? Every file will be extracted again on the next run.",
            state_path.display()
        ))?;
    if !confirmed {
        println!("Reset cancelled");
        return Ok(EXIT_OK);
    }

    open_state_store(&state_path, true)
        .with_context(|| format!("resetting state at {}", state_path.display()))?;
    println!("State cleared: {}", state_path.display());
    Ok(EXIT_OK)
}

/// Read-only commands never create a state file.
fn open_existing_state(path: &Path) -> Result<Box<dyn StateStore>> {
    if !path.exists() {
        return Ok(Box::new(MemoryStateStore::new()));
    }
    open_state_store(path, false).with_context(|| format!("opening state at {}", path.display()))
}

fn exit_code(summary: &Summary) -> u8 {
    if summary.has_failures() {
        EXIT_FILE_FAILURES
    } else {
        EXIT_OK
    }
}

fn print_summary(summary: &Summary) {
    println!();
    info!(
        "{} files: {} extracted, {} duplicates, {} skipped, {} failed in {}",
        summary.total,
        format!("{}", summary.new).green(),
        format!("{}", summary.duplicate).yellow(),
        format!("{}", summary.skipped).cyan(),
        format!("{}", summary.failed).red(),
        format!("{:.2}s", summary.duration.as_secs_f64()).green(),
    );
    for (path, reason) in &summary.failures {
        println!("  {} {}: {}", "failed".red(), path.display(), reason);
    }
    if summary.scan_warnings > 0 {
        println!(
            "  {} directory entries could not be read",
            format!("{}", summary.scan_warnings).yellow()
        );
    }
}

/// Prints one line per classified path for `list`.
struct ListReporter;

impl psd_harvest_core::ProgressReporter for ListReporter {
    fn on_file_classified(&self, path: &Path, outcome: &psd_harvest_core::Classification) {
        let label = match outcome {
            psd_harvest_core::Classification::New { .. } => outcome.label().green(),
            psd_harvest_core::Classification::Duplicate { .. } => outcome.label().yellow(),
            psd_harvest_core::Classification::AlreadyProcessed => outcome.label().cyan(),
        };
        println!("{:>17}  {}", label, path.display());
    }

    fn on_extraction_failed(&self, path: &Path, reason: &psd_harvest_core::Error) {
        println!("{:>17}  {}: {}", "unreadable".red(), path.display(), reason);
    }
}

/// Ask a yes/no question on stdin. Anything but an explicit yes, including
/// end of input, is a no.
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} (y/N): ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
