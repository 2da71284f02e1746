use super::models::ProcessingState;
use super::StateStore;
use crate::error::StateError;

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    state: ProcessingState,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: ProcessingState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }
}

impl StateStore for MemoryStateStore {
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
        self.state.record_hash(fingerprint, base_name);
        Ok(())
    }

    fn record_processed(&mut self, path: &str) -> Result<(), StateError> {
        self.state.record_processed(path);
        Ok(())
    }

    fn record_extraction(
        &mut self,
        path: &str,
        fingerprint: &str,
        base_name: &str,
    ) -> Result<(), StateError> {
        self.state.record_extraction(path, fingerprint, base_name);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StateError> {
        self.state.clear();
        Ok(())
    }

    fn snapshot(&self) -> Result<ProcessingState, StateError> {
        Ok(self.state.clone())
    }
}
