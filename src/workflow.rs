//! Command implementations behind the CLI.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::changes;
use crate::cli::{LatestArgs, RenderArgs, RunArgs};
use crate::events::{NullSink, ProgressSink};
use crate::lm::DEFAULT_MODEL;
use crate::pipeline::{self, GenerateOptions};
use crate::render;

/// Environment switch that silences the progress overlay.
pub const DISABLE_OVERLAY_ENV: &str = "CODEMAP_DISABLE_OVERLAY";

pub fn run_run(args: RunArgs) -> Result<()> {
    let root = project_root(args.path.as_deref())?;
    let run_plan = pipeline::plan(&root)?;
    if run_plan.is_no_change() {
        println!("No change detected.");
        return Ok(());
    }
    for line in changes::render_summary(&run_plan.changes) {
        println!("{line}");
    }
    let prepared = pipeline::prepare(&root, &run_plan)?;
    println!("Wrote manifest: {}", prepared.manifest_path.display());

    let options = GenerateOptions {
        model: args.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        sink: progress_sink(args.no_overlay),
    };
    if let Some(diagram) = pipeline::generate(&root, &run_plan, &prepared, &options) {
        let _ = render::render_diagram_image(&diagram);
    }
    Ok(())
}

pub fn run_latest(args: LatestArgs) -> Result<()> {
    let root = project_root(args.path.as_deref())?;
    match pipeline::latest_diagram(&root) {
        Some(diagram) => println!("{}", diagram.display()),
        None => println!("No diagram found."),
    }
    Ok(())
}

pub fn run_render(args: RenderArgs) -> Result<()> {
    let root = project_root(args.path.as_deref())?;
    let Some(diagram) = pipeline::latest_diagram(&root) else {
        println!("No diagram found.");
        return Ok(());
    };
    match render::render_diagram_image(&diagram) {
        Some(image) => println!("Rendered diagram image at {}", image.display()),
        None => println!("No image produced."),
    }
    Ok(())
}

fn project_root(path: Option<&Path>) -> Result<PathBuf> {
    let root = match path {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().context("resolve current directory")?,
    };
    if !root.is_dir() {
        return Err(anyhow!("project root does not exist: {}", root.display()));
    }
    root.canonicalize()
        .with_context(|| format!("resolve {}", root.display()))
}

fn progress_sink(no_overlay_flag: bool) -> Arc<dyn ProgressSink> {
    if overlay_disabled(no_overlay_flag) {
        Arc::new(NullSink)
    } else {
        Arc::new(OverlaySink)
    }
}

fn overlay_disabled(flag: bool) -> bool {
    if flag {
        return true;
    }
    env::var(DISABLE_OVERLAY_ENV)
        .is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

/// Progress overlay: renders pipeline lifecycle events on stderr so stdout
/// stays machine-readable.
struct OverlaySink;

impl ProgressSink for OverlaySink {
    fn overview_started(&self, root: &Path) {
        eprintln!("Preparing overview diagram for {} ...", root.display());
    }

    fn overview_finished(&self, diagram: Option<&Path>) {
        match diagram {
            Some(diagram) => eprintln!("Generated D2 diagram at {}", diagram.display()),
            None => eprintln!("No overview diagram produced."),
        }
    }

    fn units_started(&self, count: usize) {
        eprintln!("Preparing {count} component diagrams in the background.");
    }

    fn unit_reused(&self, unit_id: &str) {
        eprintln!("Reused component diagram: {unit_id}");
    }

    fn units_finished(&self) {
        eprintln!("Component diagram generation complete.");
    }
}
