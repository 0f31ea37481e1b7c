//! Directory snapshots: walk a tree, apply exclusion rules, and hash every
//! included file into a manifest.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use crate::manifest::{FileRecord, Manifest};
use crate::util::{epoch_seconds, relativize, sha256_hex};

/// Conventional ignore file read from the project root.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Exclusion rules sourced from the root ignore file.
///
/// The hidden-entry rule (any path segment starting with `.`) is always
/// applied and is not represented here.
#[derive(Debug, Default)]
pub struct ExclusionRules {
    patterns: Vec<IgnorePattern>,
}

#[derive(Debug)]
enum IgnorePattern {
    /// Pattern ending in `/`: excludes everything under a directory of
    /// this name at any depth.
    Directory(String),
    /// Glob matched against both the file name and the full relative path.
    Glob(glob::Pattern),
}

impl ExclusionRules {
    /// Read rules from the ignore file at `root`, if present.
    pub fn load(root: &Path) -> Self {
        let path = root.join(IGNORE_FILE_NAME);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };
        Self::parse(&text)
    }

    fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_suffix('/') {
                patterns.push(IgnorePattern::Directory(name.to_string()));
                continue;
            }
            match glob::Pattern::new(line) {
                Ok(pattern) => patterns.push(IgnorePattern::Glob(pattern)),
                Err(err) => {
                    tracing::warn!("ignoring unparsable ignore pattern {line:?}: {err}");
                }
            }
        }
        Self { patterns }
    }

    /// Whether a relative file path is excluded by the ignore rules.
    pub fn excludes(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let parents: Vec<&str> = {
            let mut segments: Vec<&str> = rel_path.split('/').collect();
            segments.pop();
            segments
        };
        self.patterns.iter().any(|pattern| match pattern {
            IgnorePattern::Directory(name) => parents.iter().any(|segment| segment == name),
            IgnorePattern::Glob(glob) => glob.matches(file_name) || glob.matches(rel_path),
        })
    }

    fn excludes_dir(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| match pattern {
            IgnorePattern::Directory(dir) => dir == name,
            IgnorePattern::Glob(glob) => glob.matches(name),
        })
    }
}

/// Snapshot `root` into a manifest.
///
/// The root must be an existing directory. Individual unreadable files are
/// skipped with a warning rather than failing the whole snapshot.
pub fn snapshot(root: &Path, rules: &ExclusionRules) -> Result<Manifest> {
    if !root.is_dir() {
        return Err(anyhow!("not a directory: {}", root.display()));
    }
    let mut files = BTreeMap::new();
    walk(root, root, rules, &mut files)?;
    Ok(Manifest {
        created_at: epoch_seconds(SystemTime::now()),
        files,
    })
}

fn walk(
    dir: &Path,
    root: &Path,
    rules: &ExclusionRules,
    files: &mut BTreeMap<String, FileRecord>,
) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    let mut paths: Vec<_> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    for path in paths {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            if rules.excludes_dir(name) {
                continue;
            }
            walk(&path, root, rules, files)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }
        let Some(rel_path) = relativize(root, &path) else {
            continue;
        };
        if rules.excludes(&rel_path) {
            continue;
        }
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("skipping unreadable file {}: {err}", path.display());
                continue;
            }
        };
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("skipping unreadable file {}: {err}", path.display());
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .map(epoch_seconds)
            .unwrap_or_default();
        files.insert(
            rel_path,
            FileRecord {
                hash: sha256_hex(&bytes),
                size: metadata.len(),
                mtime,
            },
        );
    }
    Ok(())
}
