pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod extract;
pub mod hasher;
pub mod orchestrator;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use dedup::Classification;
pub use engine::{BatchRunner, Summary};
pub use error::Error;
pub use extract::{Extractor, PsdExtractor};
pub use orchestrator::{ExtractionOrchestrator, ProcessedOutput};
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::{open_state_store, StateStore};
