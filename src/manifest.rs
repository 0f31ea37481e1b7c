//! Content-addressed manifests and their per-run persistence.
//!
//! A manifest is written once into its run directory and never mutated;
//! later invocations only read it. Readers tolerate missing or malformed
//! files, since a prior run directory may have been written by a concurrent
//! invocation that did not finish.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ledger::{self, RunDir};

/// Subdirectory of a run directory holding its manifest file.
pub const MANIFEST_SUBDIR: &str = "manifest";

/// Point-in-time description of one project root.
///
/// Keys are forward-slash relative paths; the map carries every included
/// file exactly once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip)]
    pub created_at: f64,
    pub files: BTreeMap<String, FileRecord>,
}

/// Recorded state of one file. Content equality is hash equality; size and
/// mtime are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub size: u64,
    pub mtime: f64,
}

/// Manifest file path for a run directory.
pub fn manifest_path(run: &RunDir) -> PathBuf {
    run.path
        .join(MANIFEST_SUBDIR)
        .join(format!("manifest-{}.json", run.id))
}

/// Persist `manifest` into the run directory's manifest subarea.
///
/// The file name carries the run id, so writes from distinct invocations
/// can never collide.
pub fn persist(manifest: &Manifest, run: &RunDir) -> Result<PathBuf> {
    let path = manifest_path(run);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(manifest).context("serialize manifest")?;
    fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Read and parse one manifest file.
pub fn read(path: &Path) -> Result<Manifest> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let manifest =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(manifest)
}

/// Locate the most recent manifest persisted before `before_id`.
///
/// Scans run directories strictly older than `before_id` in reverse order
/// and returns the first readable, well-formed manifest. Unreadable or
/// malformed manifests are treated as absent.
pub fn find_previous(root: &Path, before_id: &str) -> Option<(RunDir, Manifest)> {
    let runs = ledger::list_run_dirs(root);
    for run in runs.into_iter().rev() {
        if run.id.as_str() >= before_id {
            continue;
        }
        let Some(path) = latest_manifest_file(&run) else {
            continue;
        };
        match read(&path) {
            Ok(manifest) => return Some((run, manifest)),
            Err(err) => {
                tracing::debug!("skipping unreadable manifest {}: {err:#}", path.display());
            }
        }
    }
    None
}

fn latest_manifest_file(run: &RunDir) -> Option<PathBuf> {
    let dir = run.path.join(MANIFEST_SUBDIR);
    let entries = fs::read_dir(&dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        name.starts_with("manifest-") && name.ends_with(".json")
                    })
        })
        .collect();
    candidates.sort();
    candidates.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::create_run_dir;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_project_root(name: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("{name}-{}-{now}", std::process::id()));
        fs::create_dir_all(&root).expect("create project root");
        root
    }

    fn sample_manifest(hash: &str) -> Manifest {
        let mut files = BTreeMap::new();
        files.insert(
            "alpha.txt".to_string(),
            FileRecord {
                hash: hash.to_string(),
                size: 5,
                mtime: 1_700_000_000.0,
            },
        );
        Manifest {
            created_at: 1_700_000_000.0,
            files,
        }
    }

    #[test]
    fn persist_writes_the_external_manifest_shape() {
        let root = temp_project_root("codemap-manifest-shape");
        let run = create_run_dir(&root, "20260101T000000Z-0001").expect("create run");
        let path = persist(&sample_manifest("abc123"), &run).expect("persist");

        assert!(path.ends_with("manifest/manifest-20260101T000000Z-0001.json"));
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read back")).expect("parse back");
        assert_eq!(raw["files"]["alpha.txt"]["hash"], "abc123");
        assert_eq!(raw["files"]["alpha.txt"]["size"], 5);
        assert!(raw["files"]["alpha.txt"]["mtime"].is_number());
        assert!(raw.get("created_at").is_none());

        fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn find_previous_returns_newest_older_manifest() {
        let root = temp_project_root("codemap-manifest-previous");
        let first = create_run_dir(&root, "20260101T000000Z-0001").expect("create first");
        let second = create_run_dir(&root, "20260102T000000Z-0001").expect("create second");
        persist(&sample_manifest("old"), &first).expect("persist first");
        persist(&sample_manifest("new"), &second).expect("persist second");

        let (run, manifest) =
            find_previous(&root, "20260103T000000Z-0001").expect("previous manifest");
        assert_eq!(run.id, "20260102T000000Z-0001");
        assert_eq!(manifest.files["alpha.txt"].hash, "new");

        // The scan is strict: a run's own id never resolves to itself.
        let (run, _) = find_previous(&root, "20260102T000000Z-0001").expect("older manifest");
        assert_eq!(run.id, "20260101T000000Z-0001");

        fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn find_previous_skips_malformed_and_missing_manifests() {
        let root = temp_project_root("codemap-manifest-malformed");
        let good = create_run_dir(&root, "20260101T000000Z-0001").expect("create good");
        persist(&sample_manifest("good"), &good).expect("persist good");

        // Newer run with a corrupt manifest.
        let corrupt = create_run_dir(&root, "20260102T000000Z-0001").expect("create corrupt");
        let corrupt_path = manifest_path(&corrupt);
        fs::create_dir_all(corrupt_path.parent().expect("parent")).expect("create subdir");
        fs::write(&corrupt_path, b"{not-json").expect("write corrupt");

        // Newest run with no manifest at all.
        create_run_dir(&root, "20260103T000000Z-0001").expect("create empty");

        let (run, manifest) =
            find_previous(&root, "20260104T000000Z-0001").expect("fall back to good");
        assert_eq!(run.id, "20260101T000000Z-0001");
        assert_eq!(manifest.files["alpha.txt"].hash, "good");

        fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn find_previous_is_none_without_prior_runs() {
        let root = temp_project_root("codemap-manifest-none");
        assert!(find_previous(&root, "20260101T000000Z-0001").is_none());
        fs::remove_dir_all(root).expect("cleanup");
    }
}
