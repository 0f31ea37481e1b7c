//! CLI argument parsing for the diagram workflow.
//!
//! The CLI is intentionally thin: commands parse here and route to
//! `workflow`, so the engine stays free of presentation concerns.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the diagram workflow.
#[derive(Parser, Debug)]
#[command(
    name = "codemap",
    version,
    about = "Architecture diagrams for a source tree, regenerated incrementally",
    after_help = "Commands:\n  run     Snapshot the project, report changes, regenerate diagrams\n  latest  Print the most recent overview diagram path\n  render  Render the most recent overview diagram to PNG\n\nExamples:\n  codemap run\n  codemap run --path /work/service --model gpt-4.1\n  codemap latest\n  codemap render",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Latest(LatestArgs),
    Render(RenderArgs),
}

/// Run command inputs for one snapshot-and-regenerate invocation.
#[derive(Parser, Debug)]
#[command(about = "Snapshot the project and regenerate diagrams for what changed")]
pub struct RunArgs {
    /// Project root to snapshot (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Model identifier passed to the text-generation service
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Disable the terminal progress overlay
    #[arg(long)]
    pub no_overlay: bool,
}

/// Latest command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the most recent overview diagram path")]
pub struct LatestArgs {
    /// Project root to inspect (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,
}

/// Render command inputs.
#[derive(Parser, Debug)]
#[command(about = "Render the most recent overview diagram to PNG")]
pub struct RenderArgs {
    /// Project root to inspect (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,
}
