//! Manifest diffing and the grouped change summary.

use std::collections::BTreeSet;

use crate::manifest::Manifest;

/// Disjoint added/modified/deleted path sets between two manifests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Diff two manifests by key set and content hash.
///
/// Hash equality is the sole modification criterion; a path whose size or
/// mtime changed but whose hash did not is unchanged.
pub fn diff(previous: &Manifest, current: &Manifest) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (path, record) in &current.files {
        match previous.files.get(path) {
            None => {
                changes.added.insert(path.clone());
            }
            Some(previous_record) if previous_record.hash != record.hash => {
                changes.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in previous.files.keys() {
        if !current.files.contains_key(path) {
            changes.deleted.insert(path.clone());
        }
    }
    changes
}

/// Render the grouped change summary lines.
///
/// Each group header appears only when its group is non-empty; an empty
/// changeset renders the single "No change detected." line.
pub fn render_summary(changes: &ChangeSet) -> Vec<String> {
    if changes.is_empty() {
        return vec!["No change detected.".to_string()];
    }
    let mut lines = Vec::new();
    if !changes.added.is_empty() {
        lines.push("New files:".to_string());
        for path in &changes.added {
            lines.push(format!("+ added file: {path}"));
        }
    }
    if !changes.modified.is_empty() {
        lines.push("Modified files:".to_string());
        for path in &changes.modified {
            lines.push(format!("~ modified file: {path}"));
        }
    }
    if !changes.deleted.is_empty() {
        lines.push("Deleted files:".to_string());
        for path in &changes.deleted {
            lines.push(format!("- deleted file: {path}"));
        }
    }
    lines
}
