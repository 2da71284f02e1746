use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "psd-harvest")]
#[command(about = "Extract layers from layered image documents, once per unique content", long_about = None)]
pub struct Cli {
    /// Log at debug level regardless of TRACING_LEVEL
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the input tree, copy new documents and extract their layers
    Run(RunArgs),
    /// Classify every document without copying, extracting or touching state
    List(ListArgs),
    /// Print the number of entries held by the state store
    Status(StateArgs),
    /// Clear the state store
    Reset(ResetArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory tree to scan
    pub input: PathBuf,
    /// Directory receiving copies and layer folders
    pub output: PathBuf,
    /// State file (default: <OUTPUT>/psd_state.json; .db/.sqlite selects SQLite)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
    /// Discard existing state before the run
    #[arg(long)]
    pub reset: bool,
    /// Do not copy source documents into the output directory
    #[arg(long)]
    pub no_copy: bool,
    /// Also extract layers marked hidden
    #[arg(long)]
    pub include_hidden: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    pub output: PathBuf,
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    pub output: PathBuf,
    #[arg(long)]
    pub state_file: Option<PathBuf>,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
