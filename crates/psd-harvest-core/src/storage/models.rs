use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The durable record behind every [`StateStore`](super::StateStore).
///
/// Ordered collections keep the serialized form byte-stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Absolute source paths whose whole pipeline completed.
    #[serde(rename = "processed", default)]
    pub processed_paths: BTreeSet<String>,
    /// Fingerprint → output base name of the first file seen with it.
    #[serde(rename = "hashes", default)]
    pub hash_to_output: BTreeMap<String, String>,
    /// Fingerprints whose layer output has been fully materialized.
    #[serde(default)]
    pub extracted: BTreeSet<String>,
}

impl ProcessingState {
    pub fn is_processed(&self, path: &str) -> bool {
        self.processed_paths.contains(path)
    }

    pub fn lookup_hash(&self, fingerprint: &str) -> Option<&str> {
        self.hash_to_output.get(fingerprint).map(String::as_str)
    }

    pub fn is_extracted(&self, fingerprint: &str) -> bool {
        self.extracted.contains(fingerprint)
    }

    /// Fingerprint that owns `base_name`, if any.
    pub fn owner_of(&self, base_name: &str) -> Option<&str> {
        self.hash_to_output
            .iter()
            .find(|(_, name)| name.as_str() == base_name)
            .map(|(fingerprint, _)| fingerprint.as_str())
    }

    /// Returns `true` if the mapping was inserted. An existing mapping is never replaced.
    pub fn record_hash(&mut self, fingerprint: &str, base_name: &str) -> bool {
        if self.hash_to_output.contains_key(fingerprint) {
            return false;
        }
        self.hash_to_output
            .insert(fingerprint.to_string(), base_name.to_string());
        true
    }

    pub fn record_processed(&mut self, path: &str) -> bool {
        self.processed_paths.insert(path.to_string())
    }

    pub fn record_extraction(&mut self, path: &str, fingerprint: &str, base_name: &str) -> bool {
        let mapped = self.record_hash(fingerprint, base_name);
        let extracted = self.extracted.insert(fingerprint.to_string());
        let processed = self.record_processed(path);
        mapped || extracted || processed
    }

    pub fn clear(&mut self) {
        self.processed_paths.clear();
        self.hash_to_output.clear();
        self.extracted.clear();
    }
}

/// Counts shown by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub processed_paths: usize,
    pub fingerprints: usize,
    pub extracted: usize,
}

impl From<&ProcessingState> for StateCounts {
    fn from(state: &ProcessingState) -> Self {
        Self {
            processed_paths: state.processed_paths.len(),
            fingerprints: state.hash_to_output.len(),
            extracted: state.extracted.len(),
        }
    }
}
