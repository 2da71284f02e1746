use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

use psd_harvest_core::error::ExtractError;
use psd_harvest_core::extract::{encode_rgba_png, ExtractionResult, Extractor};
use psd_harvest_core::hasher::fingerprint_bytes;
use psd_harvest_core::storage::{open_state_store, JsonStateStore, StateStore};
use psd_harvest_core::{AppConfig, BatchRunner, SilentReporter};

/// Deterministic stand-in for a real document decoder.
///
/// `CORRUPT` anywhere in the document fails; `LAYERS n` yields `n` layers;
/// anything else yields one layer.
#[derive(Default)]
struct FakeExtractor {
    calls: AtomicUsize,
}

impl FakeExtractor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for FakeExtractor {
    fn extract(&self, document: &[u8]) -> Result<ExtractionResult, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(document);
        if text.contains("CORRUPT") {
            return Err(ExtractError::Corrupt("bad header".to_string()));
        }
        let count = text
            .split("LAYERS ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(1);

        let shade = document.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        let layers = (0..count)
            .map(|i| encode_rgba_png(&format!("Layer {}", i + 1), &[shade, i as u8, 0, 255], 1, 1))
            .collect::<Result<Vec<_>, _>>()?;
        let composite = encode_rgba_png("composite", &[shade, 0, 0, 255], 1, 1)?;
        Ok(ExtractionResult { layers, composite })
    }
}

/// Fails every extraction after nothing but the copy happened.
struct FailingExtractor;

impl Extractor for FailingExtractor {
    fn extract(&self, _document: &[u8]) -> Result<ExtractionResult, ExtractError> {
        Err(ExtractError::Encode("disk went away".to_string()))
    }
}

fn doc_config() -> AppConfig {
    AppConfig {
        extension: "doc".to_string(),
        ..AppConfig::default()
    }
}

/// Layout:
///   in/
///     a.doc          (X)
///     b.doc          (X)  ← duplicate of a.doc
///     sub/c.doc      (Y, 3 layers)
fn create_test_tree(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.doc"), "document X LAYERS 2").unwrap();
    fs::write(root.join("b.doc"), "document X LAYERS 2").unwrap();
    fs::write(root.join("sub").join("c.doc"), "document Y LAYERS 3").unwrap();
    fs::write(root.join("notes.txt"), "not a candidate").unwrap();
}

fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                files.insert(relative, fs::read(&path).unwrap());
            }
        }
    }
    files
}

fn layer_dirs(output: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = fs::read_dir(output)
        .unwrap()
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    dirs.sort();
    dirs
}

fn copies(output: &Path) -> Vec<String> {
    let mut files: Vec<String> = fs::read_dir(output)
        .unwrap()
        .flatten()
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "doc"))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

fn assert_concrete_scenario(state_file_name: &str) {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    create_test_tree(&input);

    let state_path = output.join(state_file_name);
    let mut state = open_state_store(&state_path, false).unwrap();
    let runner = BatchRunner::new(doc_config(), FakeExtractor::default());
    let summary = runner
        .run(&input, &output, state.as_mut(), &SilentReporter)
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    assert!(!summary.has_failures());

    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.hash_to_output.len(), 2);
    assert_eq!(snapshot.processed_paths.len(), 3);

    let x = fingerprint_bytes(b"document X LAYERS 2");
    let y = fingerprint_bytes(b"document Y LAYERS 3");
    assert_eq!(snapshot.hash_to_output[&x], format!("a-{}", &x[..8]));
    assert_eq!(snapshot.hash_to_output[&y], format!("c-{}", &y[..8]));

    assert_eq!(
        copies(&output),
        vec![format!("a-{}.doc", &x[..8]), format!("c-{}.doc", &y[..8])]
    );

    let c_layers = output.join(format!("c-{}_layers", &y[..8]));
    let mut names: Vec<String> = fs::read_dir(&c_layers)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["composite.png", "layer1.png", "layer2.png", "layer3.png"]
    );
    let composite = image::load_from_memory(&fs::read(c_layers.join("composite.png")).unwrap());
    assert!(composite.is_ok());
}

#[test]
fn test_concrete_scenario_json_state() {
    assert_concrete_scenario("psd_state.json");
}

#[test]
fn test_concrete_scenario_sqlite_state() {
    assert_concrete_scenario("state.db");
}

#[test]
fn test_second_run_is_idempotent() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    create_test_tree(&input);
    let state_path = output.join("psd_state.json");

    let extractor = FakeExtractor::default();
    let runner = BatchRunner::new(doc_config(), &extractor);

    let mut state = JsonStateStore::open(&state_path).unwrap();
    runner.run(&input, &output, &mut state, &SilentReporter).unwrap();
    let tree_after_first = snapshot_tree(&output);
    assert_eq!(extractor.calls(), 2);

    let mut state = JsonStateStore::open(&state_path).unwrap();
    let summary = runner.run(&input, &output, &mut state, &SilentReporter).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.new, 0);
    assert_eq!(summary.duplicate, 0);
    assert_eq!(extractor.calls(), 2);
    assert_eq!(snapshot_tree(&output), tree_after_first);
}

#[test]
fn test_identical_files_extracted_once() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(input.join("nested")).unwrap();
    fs::write(input.join("one.doc"), "same bytes").unwrap();
    fs::write(input.join("nested").join("two.doc"), "same bytes").unwrap();

    let extractor = FakeExtractor::default();
    let mut state = open_state_store(&output.join("psd_state.json"), false).unwrap();
    let summary = BatchRunner::new(doc_config(), &extractor)
        .run(&input, &output, state.as_mut(), &SilentReporter)
        .unwrap();

    assert_eq!(summary.new, 1);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(extractor.calls(), 1);
    assert_eq!(copies(&output).len(), 1);
    assert_eq!(layer_dirs(&output).len(), 1);

    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.hash_to_output.len(), 1);
    assert_eq!(snapshot.processed_paths.len(), 2);
}

#[test]
fn test_corrupt_file_does_not_stop_run() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.doc"), "first").unwrap();
    fs::write(input.join("b.doc"), "CORRUPT").unwrap();
    fs::write(input.join("c.doc"), "third LAYERS 2").unwrap();

    let mut state = open_state_store(&output.join("psd_state.json"), false).unwrap();
    let summary = BatchRunner::new(doc_config(), FakeExtractor::default())
        .run(&input, &output, state.as_mut(), &SilentReporter)
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.has_failures());
    assert!(summary.failures[0].0.ends_with("b.doc"));
    assert!(summary.failures[0].1.contains("bad header"));
    assert_eq!(layer_dirs(&output).len(), 2);

    let failed_path = summary.failures[0].0.to_string_lossy().into_owned();
    assert!(!state.is_processed(&failed_path).unwrap());
}

#[test]
fn test_interrupted_extraction_is_completed_next_run() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("art.doc"), "artwork LAYERS 2").unwrap();
    let state_path = output.join("psd_state.json");
    let fingerprint = fingerprint_bytes(b"artwork LAYERS 2");

    let mut state = JsonStateStore::open(&state_path).unwrap();
    let summary = BatchRunner::new(doc_config(), FailingExtractor)
        .run(&input, &output, &mut state, &SilentReporter)
        .unwrap();
    assert_eq!(summary.failed, 1);

    // Copy and mapping survived; the path and the extraction did not.
    let base = format!("art-{}", &fingerprint[..8]);
    assert_eq!(copies(&output), vec![format!("{}.doc", base)]);
    assert!(layer_dirs(&output).is_empty());
    let reopened = JsonStateStore::open(&state_path).unwrap();
    assert_eq!(reopened.lookup_hash(&fingerprint).unwrap(), Some(base.clone()));
    assert!(!reopened.is_extracted(&fingerprint).unwrap());
    assert!(reopened.state().processed_paths.is_empty());

    let mut state = JsonStateStore::open(&state_path).unwrap();
    let summary = BatchRunner::new(doc_config(), FakeExtractor::default())
        .run(&input, &output, &mut state, &SilentReporter)
        .unwrap();

    assert_eq!(summary.new, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(copies(&output), vec![format!("{}.doc", base)]);
    assert_eq!(layer_dirs(&output), vec![format!("{}_layers", base)]);
    assert!(state.is_extracted(&fingerprint).unwrap());
    assert_eq!(state.state().processed_paths.len(), 1);
}

#[test]
fn test_reset_reprocesses_everything() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    create_test_tree(&input);
    let state_path = output.join("psd_state.json");

    let extractor = FakeExtractor::default();
    let runner = BatchRunner::new(doc_config(), &extractor);

    let mut state = open_state_store(&state_path, false).unwrap();
    runner.run(&input, &output, state.as_mut(), &SilentReporter).unwrap();
    let tree_before = snapshot_tree(&output);

    let mut state = open_state_store(&state_path, true).unwrap();
    assert_eq!(state.counts().unwrap().fingerprints, 0);
    let summary = runner.run(&input, &output, state.as_mut(), &SilentReporter).unwrap();

    assert_eq!(summary.new, 2);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(extractor.calls(), 4);
    assert_eq!(snapshot_tree(&output), tree_before);
}

#[test]
fn test_no_copy_still_extracts() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    create_test_tree(&input);

    let config = AppConfig {
        copy_source: false,
        ..doc_config()
    };
    let mut state = open_state_store(&output.join("psd_state.json"), false).unwrap();
    let summary = BatchRunner::new(config, FakeExtractor::default())
        .run(&input, &output, state.as_mut(), &SilentReporter)
        .unwrap();

    assert_eq!(summary.new, 2);
    assert_eq!(summary.duplicate, 1);
    assert!(copies(&output).is_empty());
    assert_eq!(layer_dirs(&output).len(), 2);
}

#[test]
fn test_output_inside_input_is_not_rescanned() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    create_test_tree(&input);
    let output = input.join("harvest");

    let extractor = FakeExtractor::default();
    let runner = BatchRunner::new(doc_config(), &extractor);
    let mut state = open_state_store(&output.join("psd_state.json"), false).unwrap();
    runner.run(&input, &output, state.as_mut(), &SilentReporter).unwrap();

    let mut state = open_state_store(&output.join("psd_state.json"), false).unwrap();
    let summary = runner.run(&input, &output, state.as_mut(), &SilentReporter).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.skipped, 3);
    assert_eq!(extractor.calls(), 2);
}

#[test]
fn test_dry_run_leaves_everything_untouched() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    create_test_tree(&input);

    let extractor = FakeExtractor::default();
    let state = psd_harvest_core::storage::MemoryStateStore::new();
    let summary = BatchRunner::new(doc_config(), &extractor)
        .dry_run(&input, &output, &state, &SilentReporter)
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.new, 3);
    assert_eq!(extractor.calls(), 0);
    assert!(!output.exists());
    assert_eq!(state.counts().unwrap().processed_paths, 0);
}

#[test]
fn test_missing_input_is_structural() {
    let tmp = tempdir().unwrap();
    let mut state = psd_harvest_core::storage::MemoryStateStore::new();
    let err = BatchRunner::new(doc_config(), FakeExtractor::default())
        .run(
            &tmp.path().join("nope"),
            &tmp.path().join("out"),
            &mut state,
            &SilentReporter,
        )
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, psd_harvest_core::Error::Structural(_)));
}
