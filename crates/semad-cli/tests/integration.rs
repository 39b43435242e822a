#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn semad(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("semad").unwrap();
    cmd.current_dir(dir.path()).env("SEMAD_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    semad(dir).arg("init").assert().success();
}

fn stories_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("docs/stories")
}

fn write_story(dir: &TempDir, filename: &str, status: &str) -> PathBuf {
    let id: Vec<&str> = filename.split('.').take(2).collect();
    let id = id.join(".");
    let body = format!(
        "---\nStoryContract:\n  version: \"1.0\"\n  story_id: \"{id}\"\n  epic_id: \"{epic}\"\n  apiEndpoints:\n    - method: POST\n      path: /api/items\n      description: create an item\n      requestBody: {{name: string}}\n      successResponse: {{id: string}}\n  filesToModify:\n    - path: src/items.rs\n      reason: handler\n---\n# Story {id}: Items\n\n## Status\n{status}\n\n## Story\nAs a user I want items.\n",
        epic = id.split('.').next().unwrap()
    );
    let dir = stories_dir(dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(filename);
    std::fs::write(&path, body).unwrap();
    path
}

fn status_line(path: &Path) -> String {
    let content = std::fs::read_to_string(path).unwrap();
    let mut lines = content.lines();
    lines.find(|l| l.trim() == "## Status").unwrap();
    lines.find(|l| !l.trim().is_empty()).unwrap().trim().to_string()
}

fn set_config(dir: &TempDir, from: &str, to: &str) {
    let path = dir.path().join(".semad/config.yaml");
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(from), "config has no '{from}':\n{content}");
    std::fs::write(&path, content.replace(from, to)).unwrap();
}

// ---------------------------------------------------------------------------
// semad init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_project_layout() {
    let dir = TempDir::new().unwrap();
    semad(&dir).arg("init").assert().success();

    assert!(dir.path().join(".semad/config.yaml").exists());
    assert!(dir.path().join(".semad/workflows/dev-qa-cycle.yaml").exists());
    assert!(dir.path().join(".semad/workflows/story-dev.yaml").exists());
    assert!(dir.path().join(".semad/runs").is_dir());
    assert!(stories_dir(&dir).join("1.1.example-story.md").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    semad(&dir).arg("init").assert().success();
    semad(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .semad/config.yaml"));
}

#[test]
fn init_keeps_existing_stories() {
    let dir = TempDir::new().unwrap();
    write_story(&dir, "3.1.mine.md", "Draft");
    init_project(&dir);
    assert!(!stories_dir(&dir).join("1.1.example-story.md").exists());
}

// ---------------------------------------------------------------------------
// semad story
// ---------------------------------------------------------------------------

#[test]
fn story_list_in_story_order() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.10.ten.md", "Draft");
    write_story(&dir, "2.2.two.md", "Approved");

    let out = semad(&dir).args(["story", "list", "2"]).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let two = stdout.find("2.2").unwrap();
    let ten = stdout.find("2.10").unwrap();
    assert!(two < ten, "{stdout}");
}

#[test]
fn story_list_json() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Approved");

    let out = semad(&dir)
        .args(["story", "list", "2", "--json"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value[0]["story_id"], "2.1");
    assert_eq!(value[0]["status"], "Approved");
}

#[test]
fn story_next_for_epic() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Done");
    write_story(&dir, "2.2.two.md", "Approved");

    semad(&dir)
        .args(["story", "next", "--epic", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.2"));
}

#[test]
fn story_next_without_approved_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Done");

    semad(&dir)
        .args(["story", "next", "--epic", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No approved stories remaining in epic 2"));
}

#[test]
fn story_set_status_by_id() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = write_story(&dir, "2.1.one.md", "Draft");

    semad(&dir)
        .args(["story", "set-status", "2.1", "approved"])
        .assert()
        .success();
    assert_eq!(status_line(&path), "Approved");

    semad(&dir)
        .args(["story", "show", "2.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status:   Approved"))
        .stdout(predicate::str::contains("contract: valid"));
}

#[test]
fn story_set_status_rejects_unknown_word() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = write_story(&dir, "2.1.one.md", "Draft");

    semad(&dir)
        .args(["story", "set-status", "2.1", "shipped"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid story status"));
    assert_eq!(status_line(&path), "Draft");
}

// ---------------------------------------------------------------------------
// semad contract / gate
// ---------------------------------------------------------------------------

#[test]
fn contract_validate_valid_story() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Approved");

    semad(&dir)
        .args(["contract", "validate", "2.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("StoryContract is valid"));
}

#[test]
fn contract_validate_reports_every_error() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = stories_dir(&dir).join("2.1.bad.md");
    std::fs::write(
        &path,
        "---\nStoryContract:\n  version: \"1.0\"\n  story_id: \"2.1\"\n  apiEndpoints:\n    - method: FETCH\n      path: /x\n      description: d\n      requestBody: {}\n      successResponse: {}\n---\n# Bad\n\n## Status\nDraft\n",
    )
    .unwrap();

    semad(&dir)
        .args(["contract", "validate", "2.1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Missing required field: epic_id"))
        .stdout(predicate::str::contains("Missing required field: filesToModify"))
        .stdout(predicate::str::contains("Invalid value at /apiEndpoints/0/method"))
        .stderr(predicate::str::contains("3 validation error(s)"));
}

#[test]
fn contract_validate_json() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Approved");

    let out = semad(&dir)
        .args(["contract", "validate", "2.1", "--json"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["valid"], true);
    assert_eq!(value["errors"], serde_json::json!([]));
}

#[test]
fn gate_dev_passes_and_qa_fails_for_approved_story() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Approved");

    semad(&dir)
        .args(["gate", "dev", "2.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev gate: PASSED"));
    semad(&dir)
        .args(["gate", "qa", "2.1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[ ] status"));
}

#[test]
fn gate_planning_needs_documents() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir).args(["gate", "planning"]).assert().failure();

    std::fs::create_dir_all(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/prd.md"), "# PRD\n").unwrap();
    std::fs::write(dir.path().join("docs/architecture.md"), "# Architecture\n").unwrap();
    semad(&dir).args(["gate", "planning"]).assert().success();
}

// ---------------------------------------------------------------------------
// semad epic
// ---------------------------------------------------------------------------

#[test]
fn epic_run_completes_epic_with_simulated_agents() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let s1 = write_story(&dir, "2.1.one.md", "Done");
    let s2 = write_story(&dir, "2.2.two.md", "Approved");
    let s3 = write_story(&dir, "2.3.three.md", "Approved");

    semad(&dir)
        .args(["epic", "run", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 story(ies) processed"))
        .stdout(predicate::str::contains("epic complete"));

    for path in [&s1, &s2, &s3] {
        assert_eq!(status_line(path), "Done");
    }
    let runs = std::fs::read_dir(dir.path().join(".semad/runs")).unwrap().count();
    assert_eq!(runs, 2);
}

#[test]
fn epic_run_leaves_unapproved_story_in_progress() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    set_config(&dir, "approve_on_iteration: 1", "approve_on_iteration: 5");
    let path = write_story(&dir, "2.1.one.md", "Approved");

    let out = semad(&dir)
        .args(["epic", "run", "2", "--max-iterations", "2", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["processed_stories"], 0);
    assert_eq!(report["epic_completed"], false);
    assert_eq!(status_line(&path), "InProgress");
}

#[test]
fn epic_run_accept_on_exhaustion_marks_done() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    set_config(&dir, "approve_on_iteration: 1", "approve_on_iteration: 5");
    let path = write_story(&dir, "2.1.one.md", "Approved");

    semad(&dir)
        .args(["epic", "run", "2", "--max-iterations", "2", "--accept-on-exhaustion"])
        .assert()
        .success();
    assert_eq!(status_line(&path), "Done");
}

#[test]
fn epic_run_linear_flow_single_pass() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    set_config(&dir, "approve_on_iteration: 1", "approve_on_iteration: 2");
    let path = write_story(&dir, "2.1.one.md", "Approved");

    semad(&dir)
        .args(["epic", "run", "2", "--flow", "linear"])
        .assert()
        .success();
    assert_eq!(status_line(&path), "InProgress");
}

#[test]
fn epic_run_skips_story_with_invalid_contract() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let bad = stories_dir(&dir).join("2.1.bad.md");
    std::fs::write(&bad, "# Bad\n\n## Status\nApproved\n").unwrap();
    let good = write_story(&dir, "2.2.good.md", "Approved");

    semad(&dir)
        .args(["epic", "run", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 story(ies) processed"))
        .stdout(predicate::str::contains("not done: 2.1"));
    assert_eq!(status_line(&bad), "Approved");
    assert_eq!(status_line(&good), "Done");
}

#[test]
fn epic_status_counts() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_story(&dir, "2.1.one.md", "Done");
    write_story(&dir, "2.2.two.md", "Approved");
    write_story(&dir, "2.3.three.md", "Review");

    let out = semad(&dir)
        .args(["epic", "status", "2", "--json"])
        .output()
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(status["total_stories"], 3);
    assert_eq!(status["completed_stories"], 1);
    assert_eq!(status["pending_stories"], 1);
    assert_eq!(status["in_progress_stories"], 1);
    assert_eq!(status["is_complete"], false);
}

// ---------------------------------------------------------------------------
// semad workflow / runs / config
// ---------------------------------------------------------------------------

#[test]
fn workflow_list_and_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir)
        .args(["workflow", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev-qa-cycle"))
        .stdout(predicate::str::contains("planning"));
    semad(&dir)
        .args(["workflow", "show", "dev-qa-cycle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("address_qa_feedback"))
        .stdout(predicate::str::contains("feedback"));
}

#[test]
fn workflow_run_without_story() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir)
        .args(["workflow", "run", "planning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("architect/create_architecture"));
}

#[test]
fn workflow_run_against_story_records_run() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = write_story(&dir, "2.1.one.md", "Approved");

    semad(&dir)
        .args(["workflow", "run", "story-dev", "--story", "2.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.1 -> Done"));
    assert_eq!(status_line(&path), "Done");

    semad(&dir)
        .args(["runs", "--story", "2.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("story-dev"))
        .stdout(predicate::str::contains("approved"));
}

#[test]
fn workflow_unknown_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir)
        .args(["workflow", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workflow not found: nope"));
}

#[test]
fn config_validate_flags_zero_iterations() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir).args(["config", "validate"]).assert().success();

    set_config(&dir, "max_iterations: 3", "max_iterations: 0");
    semad(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("max_iterations must be at least 1"));
}

#[test]
fn config_show_lists_agents() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    semad(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev-qa-cycle"))
        .stdout(predicate::str::contains("simulated"));
}
