use crate::error::{Error, Result};
use crate::extract::{ExtractionResult, Extractor};
use crate::hasher;
use crate::storage::StateStore;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const LAYER_DIR_SUFFIX: &str = "_layers";
pub const COMPOSITE_FILE_NAME: &str = "composite.png";
const STAGING_SUFFIX: &str = ".partial";
const SHORT_FINGERPRINT_LENGTH: usize = 8;
const FINGERPRINT_LENGTH_STEP: usize = 4;
const FALLBACK_STEM: &str = "document";

/// Where a successfully processed file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOutput {
    pub base_name: String,
    pub layer_dir: PathBuf,
    /// `None` when copying is disabled.
    pub copied_to: Option<PathBuf>,
    pub layer_count: usize,
}

/// Copies, extracts and commits one new document at a time.
pub struct ExtractionOrchestrator<E> {
    output_root: PathBuf,
    extractor: E,
    copy_source: bool,
}

impl<E: Extractor> ExtractionOrchestrator<E> {
    pub fn new(output_root: impl Into<PathBuf>, extractor: E) -> Self {
        Self {
            output_root: output_root.into(),
            extractor,
            copy_source: true,
        }
    }

    pub fn with_copy_source(mut self, copy_source: bool) -> Self {
        self.copy_source = copy_source;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn layer_dir(&self, base_name: &str) -> PathBuf {
        self.output_root
            .join(format!("{}{}", base_name, LAYER_DIR_SUFFIX))
    }

    /// Run the whole per-file pipeline for a file classified as new.
    ///
    /// `path` only reaches `processed_paths` after every output is in place.
    /// The fingerprint mapping is committed right after the copy and survives
    /// a later extraction failure.
    pub fn process<S>(&self, path: &Path, fingerprint: &str, state: &mut S) -> Result<ProcessedOutput>
    where
        S: StateStore + ?Sized,
    {
        let document = fs::read(path).map_err(|e| Error::io(path, e))?;
        if hasher::fingerprint_bytes(&document) != fingerprint {
            return Err(Error::io(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "file changed since it was hashed"),
            ));
        }

        let base_name = match state.lookup_hash(fingerprint)? {
            Some(recorded) => recorded,
            None => self.choose_base_name(path, fingerprint, state)?,
        };

        let copied_to = if self.copy_source {
            let target = self.copy_target(path, &base_name);
            if file_has_fingerprint(&target, fingerprint) {
                debug!("{} already copied, skipping copy", target.display());
            } else {
                write_atomically(&self.output_root, &target, &document)?;
                info!("Copied to: {}", target.display());
            }
            state.record_hash(fingerprint, &base_name)?;
            Some(target)
        } else {
            None
        };

        let extraction = self.extractor.extract(&document)?;
        let layer_count = extraction.layers.len();
        let layer_dir = self.materialize(&base_name, &extraction)?;
        info!("Extracted {} layers to: {}", layer_count, layer_dir.display());

        state.record_extraction(&path.to_string_lossy(), fingerprint, &base_name)?;

        Ok(ProcessedOutput {
            base_name,
            layer_dir,
            copied_to,
            layer_count,
        })
    }

    /// `<stem>-<first 8 hex>`, lengthening the fingerprint prefix while the
    /// name belongs to different content.
    fn choose_base_name<S>(&self, path: &Path, fingerprint: &str, state: &S) -> Result<String>
    where
        S: StateStore + ?Sized,
    {
        let stem = path
            .file_stem()
            .map(|s| sanitize_file_name(&s.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_STEM.to_string());

        let mut prefix_length = SHORT_FINGERPRINT_LENGTH.min(fingerprint.len());
        loop {
            let candidate = format!("{}-{}", stem, &fingerprint[..prefix_length]);
            if self.is_name_available(path, &candidate, fingerprint, state)? {
                return Ok(candidate);
            }
            if prefix_length == fingerprint.len() {
                return Err(Error::io(
                    self.copy_target(path, &candidate),
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "no free output name for this content",
                    ),
                ));
            }
            debug!("Output name {} is taken, lengthening", candidate);
            prefix_length = (prefix_length + FINGERPRINT_LENGTH_STEP).min(fingerprint.len());
        }
    }

    fn is_name_available<S>(
        &self,
        path: &Path,
        candidate: &str,
        fingerprint: &str,
        state: &S,
    ) -> Result<bool>
    where
        S: StateStore + ?Sized,
    {
        if let Some(owner) = state.owner_of(candidate)? {
            return Ok(owner == fingerprint);
        }
        // An untracked file under this name: ours if a crash hit between copy
        // and commit, otherwise someone else's.
        let target = self.copy_target(path, candidate);
        Ok(!self.copy_source || !target.exists() || file_has_fingerprint(&target, fingerprint))
    }

    fn copy_target(&self, source: &Path, base_name: &str) -> PathBuf {
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_else(|| "psd".to_string());
        self.output_root.join(format!("{}.{}", base_name, extension))
    }

    /// Write every image into a staging directory, then swap it in, so the
    /// final directory is never observed half written.
    fn materialize(&self, base_name: &str, extraction: &ExtractionResult) -> Result<PathBuf> {
        let layer_dir = self.layer_dir(base_name);
        let staging = self
            .output_root
            .join(format!("{}{}{}", base_name, LAYER_DIR_SUFFIX, STAGING_SUFFIX));

        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;

        for (index, layer) in extraction.layers.iter().enumerate() {
            let layer_path = staging.join(layer_file_name(index + 1));
            fs::write(&layer_path, &layer.data).map_err(|e| Error::io(&layer_path, e))?;
            debug!("Extracted layer {}: {}", index + 1, layer.name);
        }
        let composite_path = staging.join(COMPOSITE_FILE_NAME);
        fs::write(&composite_path, &extraction.composite.data)
            .map_err(|e| Error::io(&composite_path, e))?;

        remove_dir_if_exists(&layer_dir)?;
        fs::rename(&staging, &layer_dir).map_err(|e| Error::io(&layer_dir, e))?;
        Ok(layer_dir)
    }
}

/// `layer<N>.png`, 1-indexed.
pub fn layer_file_name(position: usize) -> String {
    format!("layer{}.png", position)
}

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.trim_end_matches(['.', ' ']).to_string()
}

fn file_has_fingerprint(path: &Path, fingerprint: &str) -> bool {
    path.is_file()
        && hasher::fingerprint_file(path)
            .map(|existing| existing == fingerprint)
            .unwrap_or(false)
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(target).map_err(|e| Error::io(target, e.error))?;
    Ok(())
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(dir, e)),
    }
}
