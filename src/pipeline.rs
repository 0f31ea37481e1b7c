//! Incremental orchestration.
//!
//! Each invocation snapshots the tree, diffs against the most recent prior
//! manifest, and decides between full regeneration, partial regeneration
//! with artifact forwarding, and no work at all. Overview generation runs
//! synchronously; per-unit regeneration runs in a single fire-and-forget
//! background task observed only through logs and the run directory.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::changes::{self, ChangeSet};
use crate::events::ProgressSink;
use crate::ledger::{self, RunDir};
use crate::lm::LmClient;
use crate::manifest::{self, Manifest};
use crate::reuse;
use crate::schema::OverviewSchema;
use crate::snapshot::{snapshot, ExclusionRules};
use crate::util::relativize;

pub const COMBINED_FILE_NAME: &str = "combined_files.txt";
pub const OVERVIEW_SCHEMA_FILE: &str = "overview.json";
pub const OVERVIEW_DIAGRAM_FILE: &str = "overview.d2";

/// Conventional source subfolder targeted for generation when present.
pub const SOURCE_SUBDIR: &str = "src";

/// Outcome of the plan decision.
#[derive(Debug)]
pub enum RegenerationPlan {
    /// No usable prior manifest: regenerate everything.
    Full,
    /// Prior manifest found and the tree changed: regenerate what changed,
    /// forward the rest from `previous_run`.
    Partial { previous_run: RunDir },
    /// Prior manifest found and nothing changed: persist nothing.
    NoChange,
}

/// A planned invocation: the fresh snapshot, the reportable changes, and
/// the regeneration decision.
#[derive(Debug)]
pub struct RunPlan {
    pub run_id: String,
    pub manifest: Manifest,
    pub changes: ChangeSet,
    pub plan: RegenerationPlan,
}

impl RunPlan {
    pub fn is_no_change(&self) -> bool {
        matches!(self.plan, RegenerationPlan::NoChange)
    }
}

/// Run directory and manifest created for an invocation with work to do.
#[derive(Debug)]
pub struct PreparedRun {
    pub run: RunDir,
    pub manifest_path: PathBuf,
}

/// Options threaded through generation.
pub struct GenerateOptions {
    pub model: String,
    pub sink: Arc<dyn ProgressSink>,
}

/// Snapshot the project and decide what this invocation must do.
///
/// A missing project root is the one fatal error here; everything about
/// prior state is recovered by falling back to full regeneration.
pub fn plan(root: &Path) -> Result<RunPlan> {
    let rules = ExclusionRules::load(root);
    let current = snapshot(root, &rules)?;
    let run_id = ledger::next_run_id(root);
    match manifest::find_previous(root, &run_id) {
        None => {
            // First run: report every file as new.
            let changes = changes::diff(&Manifest::default(), &current);
            Ok(RunPlan {
                run_id,
                manifest: current,
                changes,
                plan: RegenerationPlan::Full,
            })
        }
        Some((previous_run, previous)) => {
            let changes = changes::diff(&previous, &current);
            let plan = if changes.is_empty() {
                RegenerationPlan::NoChange
            } else {
                RegenerationPlan::Partial { previous_run }
            };
            Ok(RunPlan {
                run_id,
                manifest: current,
                changes,
                plan,
            })
        }
    }
}

/// Create the run directory and persist the manifest for a plan with work.
///
/// The snapshot completed before this point, so a persisted manifest always
/// describes a fully captured tree.
pub fn prepare(root: &Path, run_plan: &RunPlan) -> Result<PreparedRun> {
    let run = ledger::create_run_dir(root, &run_plan.run_id)?;
    let manifest_path = manifest::persist(&run_plan.manifest, &run)?;
    Ok(PreparedRun { run, manifest_path })
}

/// Drive overview generation and kick off background unit regeneration.
///
/// Failures of the external service or renderer are caught here, logged,
/// and surface as "no diagram produced"; the manifest persisted by
/// [`prepare`] is untouched.
pub fn generate(
    root: &Path,
    run_plan: &RunPlan,
    prepared: &PreparedRun,
    options: &GenerateOptions,
) -> Option<PathBuf> {
    options.sink.overview_started(root);
    let diagram = match run_generation(root, run_plan, prepared, options) {
        Ok(diagram) => diagram,
        Err(err) => {
            tracing::error!("overview generation failed: {err:#}");
            None
        }
    };
    options.sink.overview_finished(diagram.as_deref());
    diagram
}

/// The most recent stored overview diagram, if any.
pub fn latest_diagram(root: &Path) -> Option<PathBuf> {
    for run in ledger::list_run_dirs(root).into_iter().rev() {
        let overview = run.path.join(OVERVIEW_DIAGRAM_FILE);
        if overview.is_file() {
            return Some(overview);
        }
        let Ok(entries) = fs::read_dir(&run.path) else {
            continue;
        };
        let mut diagrams: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "d2")
            })
            .collect();
        diagrams.sort();
        if let Some(last) = diagrams.pop() {
            return Some(last);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileStatus {
    Added,
    Updated,
    Deleted,
}

impl FileStatus {
    fn as_str(self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Updated => "updated",
            FileStatus::Deleted => "deleted",
        }
    }
}

fn run_generation(
    root: &Path,
    run_plan: &RunPlan,
    prepared: &PreparedRun,
    options: &GenerateOptions,
) -> Result<Option<PathBuf>> {
    let target = generation_target(root);

    // Fail closed: a target that cannot be expressed under the root drops
    // prior state and regenerates everything from the root itself.
    let (source_dir, prefix, prior_usable) = match relativize(root, &target) {
        Some(prefix) => (target, prefix, true),
        None => {
            tracing::warn!(
                "generation target {} is not nested under {}; regenerating fully",
                target.display(),
                root.display()
            );
            (root.to_path_buf(), String::new(), false)
        }
    };
    let previous_run = match &run_plan.plan {
        RegenerationPlan::Partial { previous_run } if prior_usable => Some(previous_run),
        _ => None,
    };

    let files = match previous_run {
        None => all_files(&run_plan.manifest, &prefix),
        Some(_) => changed_files(&run_plan.changes, &prefix),
    };
    if files.is_empty() {
        tracing::info!("no source changes within the generation target; skipping overview");
        return Ok(None);
    }

    let combined_path = prepared.run.path.join(COMBINED_FILE_NAME);
    let combined = combine_source_files(&source_dir, &files, &combined_path)?;

    let client = LmClient::from_env()?;
    let (schema_text, previous_run_path) = match previous_run {
        None => {
            let schema = client.generate_overview_schema(&combined, &options.model)?;
            (schema, None)
        }
        Some(previous_run) => {
            let previous_schema = read_previous_schema(previous_run);
            let schema =
                client.update_overview_schema(&combined, &previous_schema, &options.model)?;
            (schema, Some(previous_run.path.clone()))
        }
    };

    let schema_path = prepared.run.path.join(OVERVIEW_SCHEMA_FILE);
    fs::write(&schema_path, schema_text.as_bytes())
        .with_context(|| format!("write {}", schema_path.display()))?;

    let overview_path = prepared.run.path.join(OVERVIEW_DIAGRAM_FILE);
    match client.generate_overview_diagram(&schema_text, &options.model) {
        Ok(diagram) => {
            fs::write(&overview_path, diagram.as_bytes())
                .with_context(|| format!("write {}", overview_path.display()))?;
        }
        Err(err) => {
            tracing::error!("overview diagram generation failed: {err:#}");
        }
    }

    // Unit identities come from the schema persisted above; only now may
    // the background task start.
    spawn_unit_generation(
        schema_text,
        previous_run_path,
        prepared.run.path.clone(),
        options.model.clone(),
        Arc::clone(&options.sink),
    );

    if overview_path.is_file() {
        Ok(Some(overview_path))
    } else {
        Ok(None)
    }
}

fn generation_target(root: &Path) -> PathBuf {
    let src_root = root.join(SOURCE_SUBDIR);
    if src_root.is_dir() {
        src_root
    } else {
        root.to_path_buf()
    }
}

fn read_previous_schema(previous_run: &RunDir) -> String {
    let path = previous_run.path.join(OVERVIEW_SCHEMA_FILE);
    match fs::read_to_string(&path) {
        Ok(schema) => schema,
        Err(err) => {
            tracing::debug!("no previous overview schema at {}: {err}", path.display());
            String::new()
        }
    }
}

/// Rebase a root-relative path onto the generation target prefix.
fn rebase_path(prefix: &str, rel_path: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(rel_path.to_string());
    }
    rel_path
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

fn all_files(manifest: &Manifest, prefix: &str) -> BTreeMap<String, FileStatus> {
    manifest
        .files
        .keys()
        .filter_map(|path| rebase_path(prefix, path))
        .map(|path| (path, FileStatus::Added))
        .collect()
}

fn changed_files(changes: &ChangeSet, prefix: &str) -> BTreeMap<String, FileStatus> {
    let mut files = BTreeMap::new();
    for path in &changes.added {
        if let Some(rebased) = rebase_path(prefix, path) {
            files.insert(rebased, FileStatus::Added);
        }
    }
    for path in &changes.modified {
        if let Some(rebased) = rebase_path(prefix, path) {
            files.insert(rebased, FileStatus::Updated);
        }
    }
    for path in &changes.deleted {
        if let Some(rebased) = rebase_path(prefix, path) {
            files.insert(rebased, FileStatus::Deleted);
        }
    }
    files
}

/// Assemble the combined source listing handed to the service.
///
/// Files appear in sorted order with `[n]` line-number prefixes; deleted
/// files are listed after the content files with a header only.
fn combine_source_files(
    source_dir: &Path,
    files: &BTreeMap<String, FileStatus>,
    output_path: &Path,
) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();
    for (rel_path, status) in files {
        if *status == FileStatus::Deleted {
            continue;
        }
        parts.push(format!("### FILE: {rel_path} ({})", status.as_str()));
        let file_path = source_dir.join(rel_path);
        match fs::read(&file_path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                for (index, line) in text.lines().enumerate() {
                    parts.push(format!("[{}] {line}", index + 1));
                }
            }
            Err(err) => {
                tracing::warn!("failed to read {} for combining: {err}", file_path.display());
            }
        }
        parts.push(String::new());
    }
    for (rel_path, status) in files {
        if *status == FileStatus::Deleted {
            parts.push(format!("### FILE: {rel_path} (deleted)"));
            parts.push(String::new());
        }
    }
    let combined = format!("{}\n", parts.join("\n").trim_end());
    fs::write(output_path, combined.as_bytes())
        .with_context(|| format!("write {}", output_path.display()))?;
    Ok(combined)
}

/// Start the background unit regeneration task.
///
/// Fire-and-forget: the caller never joins it, and every error inside is
/// caught and logged at this boundary.
fn spawn_unit_generation(
    schema_text: String,
    previous_run: Option<PathBuf>,
    current_run: PathBuf,
    model: String,
    sink: Arc<dyn ProgressSink>,
) {
    let task = move || {
        let result = generate_units(
            &schema_text,
            previous_run.as_deref(),
            &current_run,
            &model,
            sink.as_ref(),
        );
        if let Err(err) = result {
            tracing::error!("unit generation failed: {err:#}");
        }
        sink.units_finished();
    };
    match thread::Builder::new()
        .name("codemap-units".to_string())
        .spawn(task)
    {
        Ok(_handle) => {}
        Err(err) => {
            tracing::error!("failed to start unit generation task: {err}");
        }
    }
}

fn generate_units(
    schema_text: &str,
    previous_run: Option<&Path>,
    current_run: &Path,
    model: &str,
    sink: &dyn ProgressSink,
) -> Result<()> {
    let schema = OverviewSchema::parse(schema_text)?;
    sink.units_started(schema.unit_ids().len());
    let regenerate = reuse::forward_units(&schema, previous_run, current_run, sink);
    if regenerate.is_empty() {
        tracing::info!("no units need regeneration");
        return Ok(());
    }
    let client = LmClient::from_env()?;
    for unit_id in &regenerate {
        if let Err(err) = generate_one_unit(&client, schema_text, unit_id, current_run, model) {
            tracing::error!("generation failed for unit {unit_id}: {err:#}");
        }
    }
    Ok(())
}

fn generate_one_unit(
    client: &LmClient,
    overview_schema: &str,
    unit_id: &str,
    run_dir: &Path,
    model: &str,
) -> Result<()> {
    let unit_schema = client.generate_unit_schema(overview_schema, unit_id, model)?;
    let schema_path = run_dir.join(format!("{unit_id}.json"));
    fs::write(&schema_path, unit_schema.as_bytes())
        .with_context(|| format!("write {}", schema_path.display()))?;
    let unit_diagram = client.generate_unit_diagram(&unit_schema, model)?;
    let diagram_path = run_dir.join(format!("{unit_id}.d2"));
    fs::write(&diagram_path, unit_diagram.as_bytes())
        .with_context(|| format!("write {}", diagram_path.display()))?;
    Ok(())
}
