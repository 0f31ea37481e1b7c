//! Tests for the diagram lookup commands against stored run directories.

mod common;

use common::{stdout_of, TestProject};

#[test]
fn latest_reports_when_no_diagram_exists() {
    let project = TestProject::new();
    project.write("file.txt", b"content");

    let output = project.codemap(&["latest"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), "No diagram found.");
}

#[test]
fn latest_prints_the_newest_overview_diagram() {
    let project = TestProject::new();
    project.write(".codemap/20260101T000000Z-0001/overview.d2", b"old: {}");
    project.write(".codemap/20260102T000000Z-0001/overview.d2", b"new: {}");

    let output = project.codemap(&["latest"]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(
        stdout.contains("20260102T000000Z-0001"),
        "expected newest run in {stdout}"
    );
    assert!(stdout.trim().ends_with("overview.d2"));
}

#[test]
fn latest_falls_back_to_unit_diagrams() {
    let project = TestProject::new();
    project.write(".codemap/20260101T000000Z-0001/auth.d2", b"auth: {}");

    let output = project.codemap(&["latest"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).trim().ends_with("auth.d2"));
}

#[test]
fn render_reports_when_no_diagram_exists() {
    let project = TestProject::new();

    let output = project.codemap(&["render"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), "No diagram found.");
}

#[test]
fn render_without_a_renderer_is_non_fatal() {
    let project = TestProject::new();
    project.write(".codemap/20260101T000000Z-0001/overview.d2", b"a -> b");

    // CODEMAP_D2_BIN is scrubbed by the fixture; unless a real d2 binary is
    // installed, rendering falls through to the no-image message.
    let output = project.codemap(&["render"]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(
        stdout.contains("Rendered diagram image at ") || stdout.trim() == "No image produced.",
        "unexpected stdout: {stdout}"
    );
}
