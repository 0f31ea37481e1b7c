//! Forwarding of per-unit artifacts from a previous run directory.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::events::ProgressSink;
use crate::schema::OverviewSchema;

/// Artifact file kinds kept per unit inside a run directory.
pub const UNIT_ARTIFACT_KINDS: [&str; 2] = ["json", "d2"];

/// Forward artifacts for units the schema marks unchanged and return the
/// ids that still need regeneration.
///
/// A unit is reused when at least one of its artifact kinds copies over;
/// missing optional kinds do not force regeneration. Units without a
/// previous run, units not marked unchanged, and units whose copies all
/// fail are regenerated. Copy failures never abort the batch.
pub fn forward_units(
    schema: &OverviewSchema,
    previous_run: Option<&Path>,
    current_run: &Path,
    sink: &dyn ProgressSink,
) -> BTreeSet<String> {
    let unchanged = schema.unchanged_ids();
    let mut regenerate = BTreeSet::new();
    for unit_id in schema.unit_ids() {
        if !unchanged.contains(&unit_id) {
            regenerate.insert(unit_id);
            continue;
        }
        let Some(previous_run) = previous_run else {
            regenerate.insert(unit_id);
            continue;
        };
        if forward_one(&unit_id, previous_run, current_run) {
            sink.unit_reused(&unit_id);
        } else {
            regenerate.insert(unit_id);
        }
    }
    regenerate
}

fn forward_one(unit_id: &str, previous_run: &Path, current_run: &Path) -> bool {
    let mut copied = false;
    for kind in UNIT_ARTIFACT_KINDS {
        let file_name = format!("{unit_id}.{kind}");
        match copy_artifact(previous_run, current_run, &file_name) {
            Ok(true) => copied = true,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!("failed to forward {file_name}: {err:#}");
            }
        }
    }
    if copied {
        tracing::info!("reused unit artifacts: {unit_id}");
    }
    copied
}

/// Copy one artifact file between run directories.
///
/// `Ok(false)` means the source does not exist; errors mean the copy was
/// attempted and failed.
fn copy_artifact(previous_run: &Path, current_run: &Path, file_name: &str) -> Result<bool> {
    let source = previous_run.join(file_name);
    if !source.is_file() {
        return Ok(false);
    }
    let dest = current_run.join(file_name);
    fs::copy(&source, &dest)
        .with_context(|| format!("copy {} to {}", source.display(), dest.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_run_pair(name: &str) -> (PathBuf, PathBuf, PathBuf) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let base = std::env::temp_dir().join(format!("{name}-{}-{now}", std::process::id()));
        let previous = base.join("previous");
        let current = base.join("current");
        fs::create_dir_all(&previous).expect("create previous run");
        fs::create_dir_all(&current).expect("create current run");
        (base, previous, current)
    }

    fn schema(json: &str) -> OverviewSchema {
        OverviewSchema::parse(json).expect("parse schema")
    }

    #[test]
    fn unchanged_units_forward_byte_identical_artifacts() {
        let (base, previous, current) = temp_run_pair("codemap-reuse-forward");
        fs::write(previous.join("auth.json"), b"{\"id\":\"auth\"}").expect("write schema");
        fs::write(previous.join("auth.d2"), b"auth: {}").expect("write diagram");

        let regenerate = forward_units(
            &schema(r#"{"nodes": [{"id": "auth", "status": "unchanged"}]}"#),
            Some(&previous),
            &current,
            &NullSink,
        );

        assert!(regenerate.is_empty());
        assert_eq!(
            fs::read(current.join("auth.json")).expect("read forwarded schema"),
            b"{\"id\":\"auth\"}"
        );
        assert_eq!(
            fs::read(current.join("auth.d2")).expect("read forwarded diagram"),
            b"auth: {}"
        );

        fs::remove_dir_all(base).expect("cleanup");
    }

    #[test]
    fn partial_artifacts_still_count_as_reuse() {
        let (base, previous, current) = temp_run_pair("codemap-reuse-partial");
        fs::write(previous.join("auth.d2"), b"auth: {}").expect("write diagram only");

        let regenerate = forward_units(
            &schema(r#"{"nodes": [{"id": "auth", "status": "unchanged"}]}"#),
            Some(&previous),
            &current,
            &NullSink,
        );

        assert!(regenerate.is_empty());
        assert!(current.join("auth.d2").is_file());
        assert!(!current.join("auth.json").exists());

        fs::remove_dir_all(base).expect("cleanup");
    }

    #[test]
    fn units_with_no_artifacts_fall_back_to_regeneration() {
        let (base, previous, current) = temp_run_pair("codemap-reuse-missing");

        let regenerate = forward_units(
            &schema(
                r#"{"nodes": [
                    {"id": "auth", "status": "unchanged"},
                    {"id": "store", "status": "changed"},
                    {"id": "cli", "status": "unknown"}
                ]}"#,
            ),
            Some(&previous),
            &current,
            &NullSink,
        );

        let ids: Vec<&str> = regenerate.iter().map(String::as_str).collect();
        assert_eq!(ids, ["auth", "cli", "store"]);

        fs::remove_dir_all(base).expect("cleanup");
    }

    #[test]
    fn without_a_previous_run_every_unit_regenerates() {
        let (base, _previous, current) = temp_run_pair("codemap-reuse-no-previous");

        let regenerate = forward_units(
            &schema(r#"{"nodes": [{"id": "auth", "status": "unchanged"}]}"#),
            None,
            &current,
            &NullSink,
        );

        assert_eq!(regenerate.len(), 1);
        assert!(regenerate.contains("auth"));

        fs::remove_dir_all(base).expect("cleanup");
    }
}
