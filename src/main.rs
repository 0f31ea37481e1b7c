//! codemap: architecture diagrams for a source tree, regenerated
//! incrementally from content-addressed snapshots.

use anyhow::Result;
use clap::Parser;

mod changes;
mod cli;
mod events;
mod ledger;
mod lm;
mod manifest;
mod pipeline;
mod render;
mod reuse;
mod schema;
mod snapshot;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Run(args) => workflow::run_run(args),
        Command::Latest(args) => workflow::run_latest(args),
        Command::Render(args) => workflow::run_render(args),
    }
}
