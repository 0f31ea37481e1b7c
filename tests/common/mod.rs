//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A scratch project the codemap binary runs against.
pub struct TestProject {
    dir: TempDir,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel_path: &str, contents: &[u8]) {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, contents).expect("write project file");
    }

    #[allow(dead_code)]
    pub fn delete(&self, rel_path: &str) {
        fs::remove_file(self.dir.path().join(rel_path)).expect("delete project file");
    }

    /// Run a codemap subcommand against the project.
    ///
    /// The service key is scrubbed from the child environment so no test
    /// ever reaches the network, and the overlay is silenced.
    pub fn codemap(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_codemap"))
            .args(args)
            .arg("--path")
            .arg(self.dir.path())
            .env_remove("OPENAI_API_KEY")
            .env_remove("CODEMAP_D2_BIN")
            .env("CODEMAP_DISABLE_OVERLAY", "1")
            .output()
            .expect("run codemap binary")
    }

    #[allow(dead_code)]
    pub fn run(&self) -> Output {
        self.codemap(&["run"])
    }

    /// All persisted manifest files, sorted by path.
    #[allow(dead_code)]
    pub fn manifest_files(&self) -> Vec<PathBuf> {
        let state_root = self.dir.path().join(".codemap");
        let Ok(entries) = fs::read_dir(&state_root) else {
            return Vec::new();
        };
        let mut manifests = Vec::new();
        for entry in entries.flatten() {
            let manifest_dir = entry.path().join("manifest");
            let Ok(files) = fs::read_dir(&manifest_dir) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                let is_manifest = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        name.starts_with("manifest-") && name.ends_with(".json")
                    });
                if is_manifest {
                    manifests.push(path);
                }
            }
        }
        manifests.sort();
        manifests
    }

    /// Parse the most recently written manifest.
    #[allow(dead_code)]
    pub fn latest_manifest(&self) -> serde_json::Value {
        let manifests = self.manifest_files();
        let path = manifests.last().expect("expected at least one manifest");
        serde_json::from_slice(&fs::read(path).expect("read manifest"))
            .expect("parse manifest JSON")
    }
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[allow(dead_code)]
pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
