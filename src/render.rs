//! Diagram image rendering through the external `d2` CLI.
//!
//! Rendering is best-effort: a missing binary or a failed render logs
//! guidance and produces no image, never an error for the caller.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Environment override for the renderer invocation. The value is
/// shell-split, so a command with flags works.
pub const D2_BIN_ENV: &str = "CODEMAP_D2_BIN";

const FALLBACK_PATHS: [&str; 3] = ["/opt/homebrew/bin/d2", "/usr/local/bin/d2", "/usr/bin/d2"];
const PROBE_DEADLINE: Duration = Duration::from_secs(5);
const RENDER_DEADLINE: Duration = Duration::from_secs(30);

/// Render a `.d2` file to a PNG next to it.
///
/// Returns the image path on success; on any failure the cause is logged
/// and `None` is returned.
pub fn render_diagram_image(diagram_path: &Path) -> Option<PathBuf> {
    let image_path = diagram_path.with_extension("png");
    let content = match fs::read_to_string(diagram_path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(
                "failed to read diagram {} for rendering: {err}",
                diagram_path.display()
            );
            return None;
        }
    };
    let rendered = render_to_png(&content, &image_path)?;
    tracing::info!("rendered diagram image at {}", rendered.display());
    Some(rendered)
}

fn render_to_png(content: &str, output_path: &Path) -> Option<PathBuf> {
    let Some(argv) = find_d2_command() else {
        tracing::warn!(
            "install the d2 CLI to render diagrams to images (e.g. brew install d2) \
             or set {D2_BIN_ENV} to the binary path"
        );
        return None;
    };
    match run_render(&argv, content, output_path) {
        Ok(Some(output)) if output.status.success() => Some(output_path.to_path_buf()),
        Ok(Some(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("d2 CLI failed (command={argv:?}): {}", stderr.trim());
            None
        }
        Ok(None) => {
            tracing::error!("d2 CLI timed out (command={argv:?})");
            None
        }
        Err(err) => {
            tracing::error!("d2 CLI render error (command={argv:?}): {err:#}");
            None
        }
    }
}

fn run_render(argv: &[String], content: &str, output_path: &Path) -> Result<Option<Output>> {
    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .arg("-")
        .arg(output_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().context("spawn d2 CLI")?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(content.as_bytes())
            .context("write diagram to d2 stdin")?;
    }
    wait_with_deadline(child, RENDER_DEADLINE)
}

/// Locate a working renderer invocation: env override first, then PATH,
/// then conventional install locations. A candidate must answer a
/// `--version` probe to be accepted.
pub fn find_d2_command() -> Option<Vec<String>> {
    if let Ok(raw) = env::var(D2_BIN_ENV) {
        match shell_words::split(&raw) {
            Ok(argv) if !argv.is_empty() => {
                if probe(&argv) {
                    return Some(argv);
                }
                tracing::warn!("{D2_BIN_ENV}={raw:?} did not answer a --version probe");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("failed to parse {D2_BIN_ENV}={raw:?}: {err}");
            }
        }
    }
    if let Ok(path) = which::which("d2") {
        let argv = vec![path.to_string_lossy().into_owned()];
        if probe(&argv) {
            return Some(argv);
        }
    }
    for candidate in FALLBACK_PATHS {
        if !Path::new(candidate).is_file() {
            continue;
        }
        let argv = vec![candidate.to_string()];
        if probe(&argv) {
            return Some(argv);
        }
    }
    None
}

fn probe(argv: &[String]) -> bool {
    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = match command.spawn() {
        Ok(child) => child,
        Err(_) => return false,
    };
    matches!(
        wait_with_deadline(child, PROBE_DEADLINE),
        Ok(Some(output)) if output.status.success()
    )
}

/// Wait for a child with a deadline. `Ok(None)` means the deadline passed
/// and the child was killed.
fn wait_with_deadline(mut child: Child, deadline: Duration) -> Result<Option<Output>> {
    let start = Instant::now();
    loop {
        if child.try_wait().context("poll child process")?.is_some() {
            let output = child
                .wait_with_output()
                .context("collect child process output")?;
            return Ok(Some(output));
        }
        if start.elapsed() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
