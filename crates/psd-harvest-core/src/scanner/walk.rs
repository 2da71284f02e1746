use super::FileRecord;
use glob::Pattern;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Recursive, case-insensitive extension scan of one root directory.
///
/// Entries are visited sorted by file name, so two scans of an unchanged tree
/// yield the same sequence. The scanner keeps no cursor: resuming is done by
/// re-scanning and asking the state store what is already done.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    extension: String,
    ignore_patterns: Vec<Pattern>,
    excluded_dirs: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            ignore_patterns: Vec::new(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Invalid glob patterns are logged and dropped.
    pub fn with_ignore_patterns(mut self, ignore_globs: &[String]) -> Self {
        self.ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    /// Never descend into `dir` (used for the output root). `dir` need not
    /// exist yet.
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        self.excluded_dirs.push(resolve_dir(dir));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> ScanIter<'_> {
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        ScanIter {
            scanner: self,
            inner: WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
            warnings: 0,
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        if self.excluded_dirs.is_empty() {
            return false;
        }
        let resolved = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
        self.excluded_dirs.iter().any(|dir| *dir == resolved)
    }
}

/// Canonical form of `dir`, resolving the deepest existing ancestor when the
/// directory itself is missing, so it compares equal to walked entries once
/// it is created.
fn resolve_dir(dir: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(dir) {
        return canonical;
    }
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |resolved, part| resolved.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Lazy iterator over the candidate files of a [`Scanner`].
pub struct ScanIter<'a> {
    scanner: &'a Scanner,
    inner: walkdir::IntoIter,
    warnings: usize,
}

impl ScanIter<'_> {
    /// Entries skipped because they could not be read (permissions, loops, ...).
    pub fn warnings(&self) -> usize {
        self.warnings
    }
}

impl Iterator for ScanIter<'_> {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.warnings += 1;
                    if let Some(ancestor) = err.loop_ancestor() {
                        warn!(
                            "Skipping symlink loop at {} (points back to {})",
                            err.path().map(|p| p.display().to_string()).unwrap_or_default(),
                            ancestor.display()
                        );
                    } else {
                        warn!("Skipping unreadable entry: {}", err);
                    }
                    continue;
                }
            };

            let path = entry.path();

            if entry.file_type().is_dir() {
                if entry.depth() > 0
                    && (self.scanner.is_excluded_dir(&entry) || self.scanner.is_ignored(path))
                {
                    trace!("Skipping directory {}", path.display());
                    self.inner.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file()
                || !self.scanner.matches_extension(path)
                || self.scanner.is_ignored(path)
            {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    self.warnings += 1;
                    warn!("Error getting metadata for {}: {}", path.display(), err);
                    continue;
                }
            };

            match fs::canonicalize(path) {
                Ok(canonical) => return Some(FileRecord::new(canonical, size)),
                Err(err) => {
                    self.warnings += 1;
                    warn!("Error canonicalizing {}: {}", path.display(), err);
                }
            }
        }
    }
}
