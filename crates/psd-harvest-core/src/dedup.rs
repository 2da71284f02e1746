use crate::error::{Error, Result};
use crate::scanner::FileRecord;
use crate::storage::StateStore;
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Content not yet extracted. `existing_base` is set when an earlier
    /// attempt already registered (and possibly copied) this fingerprint.
    New {
        fingerprint: String,
        existing_base: Option<String>,
    },
    /// Content identical to an already extracted file.
    Duplicate {
        fingerprint: String,
        base_name: String,
    },
    AlreadyProcessed,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::New { .. } => "new",
            Classification::Duplicate { .. } => "duplicate",
            Classification::AlreadyProcessed => "already_processed",
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Classification::New { fingerprint, .. }
            | Classification::Duplicate { fingerprint, .. } => Some(fingerprint),
            Classification::AlreadyProcessed => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify one scanned file against the state.
///
/// The processed-path lookup runs first so that completed files are never
/// re-read. A fingerprint only counts as a duplicate once its extraction has
/// completed; a mapping left behind by a failed extraction yields `New` with
/// the recorded base name, so the retry skips the copy but still extracts.
pub fn classify<S>(record: &mut FileRecord, state: &S) -> Result<Classification>
where
    S: StateStore + ?Sized,
{
    let key = record.key();
    if state.is_processed(&key)? {
        trace!("{} already processed", key);
        return Ok(Classification::AlreadyProcessed);
    }

    let path = record.path.clone();
    let fingerprint = record
        .fingerprint()
        .map_err(|e| Error::io(path, e))?
        .to_string();

    match state.lookup_hash(&fingerprint)? {
        Some(base_name) if state.is_extracted(&fingerprint)? => Ok(Classification::Duplicate {
            fingerprint,
            base_name,
        }),
        existing_base => Ok(Classification::New {
            fingerprint,
            existing_base,
        }),
    }
}
