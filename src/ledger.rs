//! Run ledger: versioned run directories under the per-project state root.
//!
//! Every invocation that produces artifacts gets its own run directory named
//! by a sortable id, so history is append-only and concurrent invocations
//! never contend for write paths.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the state root directory kept inside each project.
pub const STATE_DIR_NAME: &str = ".codemap";

/// One run directory: sortable id plus its on-disk location.
#[derive(Debug, Clone)]
pub struct RunDir {
    pub id: String,
    pub path: PathBuf,
}

fn run_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{8}T\d{6}Z-\d{4}$").expect("run id pattern is a valid regex")
    })
}

/// Whether `id` matches the `YYYYMMDDTHHMMSSZ-NNNN` run id shape.
pub fn is_run_id(id: &str) -> bool {
    run_id_pattern().is_match(id)
}

/// Mint a fresh run id from the UTC clock and a random disambiguator.
pub fn new_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix: u16 = rand::rng().random_range(0..10_000);
    format!("{timestamp}-{suffix:04}")
}

/// Mint a run id that sorts strictly after every existing run id.
///
/// Id order defines run order, so an invocation landing in the same clock
/// second as the previous one must not draw a smaller disambiguator.
pub fn next_run_id(root: &Path) -> String {
    let candidate = new_run_id();
    let latest = list_run_dirs(root).pop().map(|run| run.id);
    match latest {
        Some(latest) if candidate <= latest => bump_run_id(&latest, candidate),
        _ => candidate,
    }
}

fn bump_run_id(latest: &str, fallback: String) -> String {
    let Some((stamp, suffix)) = latest.rsplit_once('-') else {
        return fallback;
    };
    let next = suffix.parse::<u32>().unwrap_or(0) + 1;
    if next > 9_999 {
        return fallback;
    }
    format!("{stamp}-{next:04}")
}

/// Return the state root path for a project, creating it if needed.
///
/// A legacy marker file occupying the state root path is replaced by a
/// directory; run history from the marker era does not exist, so nothing is
/// lost.
pub fn ensure_state_root(root: &Path) -> Result<PathBuf> {
    let state_root = root.join(STATE_DIR_NAME);
    if state_root.exists() && !state_root.is_dir() {
        fs::remove_file(&state_root)
            .with_context(|| format!("remove legacy marker {}", state_root.display()))?;
    }
    if !state_root.is_dir() {
        fs::create_dir(&state_root)
            .with_context(|| format!("create {}", state_root.display()))?;
    }
    Ok(state_root)
}

/// Create the run directory for `id` under the project's state root.
pub fn create_run_dir(root: &Path, id: &str) -> Result<RunDir> {
    let state_root = ensure_state_root(root)?;
    let path = state_root.join(id);
    fs::create_dir(&path).with_context(|| format!("create run dir {}", path.display()))?;
    Ok(RunDir {
        id: id.to_string(),
        path,
    })
}

/// List existing run directories, sorted by id (creation order).
///
/// Entries that do not match the run id shape are ignored. A missing state
/// root yields an empty list rather than an error.
pub fn list_run_dirs(root: &Path) -> Vec<RunDir> {
    let state_root = root.join(STATE_DIR_NAME);
    let entries = match fs::read_dir(&state_root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut runs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_run_id(name) {
            continue;
        }
        runs.push(RunDir {
            id: name.to_string(),
            path,
        });
    }
    runs.sort_by(|a, b| a.id.cmp(&b.id));
    runs
}
