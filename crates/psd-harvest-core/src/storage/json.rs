use super::models::ProcessingState;
use super::StateStore;
use crate::error::StateError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// JSON file backend. The whole state is rewritten (temp file + rename)
/// after every mutation.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    state: ProcessingState,
}

impl JsonStateStore {
    /// Load the state file, or start empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<ProcessingState>(&bytes).map_err(|source| {
                StateError::Parse {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                ProcessingState::default()
            }
            Err(source) => return Err(StateError::Read { path, source }),
        };
        info!(
            "Loaded state: {} processed files, {} fingerprints",
            state.processed_paths.len(),
            state.hash_to_output.len()
        );
        Ok(Self { path, state })
    }

    /// Discard whatever is at `path` and write an empty state in its place.
    pub fn create_empty(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let store = Self {
            path: path.into(),
            state: ProcessingState::default(),
        };
        store.persist()?;
        info!("State file reset: {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    fn persist(&self) -> Result<(), StateError> {
        self.write_atomically().map_err(|source| StateError::Persist {
            path: self.path.clone(),
            source,
        })?;
        debug!("State saved to {}", self.path.display());
        Ok(())
    }

    fn write_atomically(&self) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn persist_if(&self, changed: bool) -> Result<(), StateError> {
        if changed {
            self.persist()
        } else {
            Ok(())
        }
    }
}

impl StateStore for JsonStateStore {
    fn is_processed(&self, path: &str) -> Result<bool, StateError> {
        Ok(self.state.is_processed(path))
    }

    fn lookup_hash(&self, fingerprint: &str) -> Result<Option<String>, StateError> {
        Ok(self.state.lookup_hash(fingerprint).map(str::to_string))
    }

    fn is_extracted(&self, fingerprint: &str) -> Result<bool, StateError> {
        Ok(self.state.is_extracted(fingerprint))
    }

    fn owner_of(&self, base_name: &str) -> Result<Option<String>, StateError> {
        Ok(self.state.owner_of(base_name).map(str::to_string))
    }

    fn record_hash(&mut self, fingerprint: &str, base_name: &str) -> Result<(), StateError> {
        let changed = self.state.record_hash(fingerprint, base_name);
        self.persist_if(changed)
    }

    fn record_processed(&mut self, path: &str) -> Result<(), StateError> {
        let changed = self.state.record_processed(path);
        self.persist_if(changed)
    }

    fn record_extraction(
        &mut self,
        path: &str,
        fingerprint: &str,
        base_name: &str,
    ) -> Result<(), StateError> {
        let changed = self.state.record_extraction(path, fingerprint, base_name);
        self.persist_if(changed)
    }

    fn reset(&mut self) -> Result<(), StateError> {
        self.state.clear();
        self.persist()
    }

    fn snapshot(&self) -> Result<ProcessingState, StateError> {
        Ok(self.state.clone())
    }
}
