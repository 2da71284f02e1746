mod walk;

pub use walk::{ScanIter, Scanner};

use crate::hasher;
use std::io;
use std::path::PathBuf;

/// A candidate document found by the [`Scanner`].
///
/// The fingerprint is only computed when a classification needs it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    fingerprint: Option<String>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            fingerprint: None,
        }
    }

    /// State key for this file: its absolute path as a string.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn fingerprint(&mut self) -> io::Result<&str> {
        if self.fingerprint.is_none() {
            self.fingerprint = Some(hasher::fingerprint_file(&self.path)?);
        }
        Ok(self.fingerprint.as_deref().unwrap_or_default())
    }

    pub fn cached_fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}
