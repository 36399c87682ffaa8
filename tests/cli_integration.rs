//! Integration tests for the loopwright CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the loopwright binary, scoped to `project`
fn loopwright(project: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("loopwright"));
    cmd.arg("--project")
        .arg(project.path())
        .env("XDG_CONFIG_HOME", project.path().join("xdg"))
        .env_remove("RUST_LOG");
    cmd
}

fn snapshot_path(project: &TempDir) -> std::path::PathBuf {
    project.path().join(".loopwright/loop-state.json")
}

fn history_path(project: &TempDir) -> std::path::PathBuf {
    project.path().join(".loopwright/history.jsonl")
}

#[test]
fn test_help() {
    Command::new(cargo::cargo_bin!("loopwright"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Iterative loop controller"));
}

#[test]
fn test_version() {
    Command::new(cargo::cargo_bin!("loopwright"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_start_writes_snapshot() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "Fix the build", "--max-iterations", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loop started at iteration 1"))
        .stdout(predicate::str::contains("Fix the build"));

    let raw = std::fs::read_to_string(snapshot_path(&temp)).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["iteration"], 1);
    assert_eq!(snapshot["maxIterations"], 3);
    assert_eq!(snapshot["active"], true);
}

#[test]
fn test_start_rejects_blank_prompt() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "   "])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("prompt"));

    assert!(!snapshot_path(&temp).exists());
}

#[test]
fn test_start_rejects_negative_max_iterations() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "task", "--max-iterations=-1"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("maxIterations"));
}

#[test]
fn test_start_refuses_active_loop_without_force() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp).args(["start", "first"]).assert().success();
    loopwright(&temp)
        .args(["start", "second"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already active"));
    loopwright(&temp)
        .args(["start", "second", "--force"])
        .assert()
        .success();

    let raw = std::fs::read_to_string(snapshot_path(&temp)).unwrap();
    assert!(raw.contains("\"prompt\": \"second\""));
}

#[test]
fn test_iterate_without_loop() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["iterate", "--output", "hello", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reason\": \"no active loop\""));
}

#[test]
fn test_loop_runs_to_max_iterations() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "task", "--max-iterations", "2"])
        .assert()
        .success();

    loopwright(&temp)
        .args(["iterate", "--output", "first try", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completed\": false"))
        .stdout(predicate::str::contains("\"iteration\": 2"))
        .stdout(predicate::str::contains("\"nextPrompt\": \"task\""));

    loopwright(&temp)
        .args(["iterate", "--output", "second try"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max iterations reached"));

    assert!(!snapshot_path(&temp).exists());
    let log = std::fs::read_to_string(history_path(&temp)).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[test]
fn test_completion_promise_from_stdin() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "task", "--completion-promise", "DONE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<promise>DONE</promise>"));

    loopwright(&temp)
        .args(["iterate", "--json"])
        .write_stdin("All tests pass.\n<promise>DONE</promise>\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completionDetected\": true"))
        .stdout(predicate::str::contains("completion promise detected"));

    loopwright(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active loop"));
}

#[test]
fn test_iterate_records_metadata() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp).args(["start", "task"]).assert().success();
    loopwright(&temp)
        .args([
            "iterate",
            "--output",
            "tried again",
            "--error",
            "Error at /src/a.rs:1:2",
            "--file",
            "src/a.rs",
        ])
        .assert()
        .success();

    let output = loopwright(&temp)
        .args(["history", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let history: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(history[0]["errors"][0], "Error at /src/a.rs:1:2");
    assert_eq!(history[0]["filesModified"][0], "src/a.rs");
    assert!(history[0].get("commandsRun").is_none());
}

#[test]
fn test_cancel() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active loop"));

    loopwright(&temp).args(["start", "task"]).assert().success();
    loopwright(&temp)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loop cancelled"));
    assert!(!snapshot_path(&temp).exists());
}

#[test]
fn test_status_json() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "task", "--max-iterations", "5"])
        .assert()
        .success();

    let output = loopwright(&temp)
        .args(["status", "--json"])
        .output()
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["active"], true);
    assert_eq!(status["state"]["maxIterations"], 5);
}

#[test]
fn test_log_survives_cancel() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp).args(["start", "task"]).assert().success();
    for n in 0..3 {
        loopwright(&temp)
            .args(["iterate", "--output", &format!("attempt {n}")])
            .assert()
            .success();
    }
    loopwright(&temp).arg("cancel").assert().success();

    loopwright(&temp)
        .args(["log", "--tail", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#3"))
        .stdout(predicate::str::contains("attempt 2"))
        .stdout(predicate::str::contains("#1").not());
}

#[test]
fn test_start_from_template() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["start", "--template", "bugfix", "crash on empty input"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bug: crash on empty input"))
        .stdout(predicate::str::contains("<promise>FIXED</promise>"))
        .stdout(predicate::str::contains("iterate --preset rust"));

    loopwright(&temp)
        .args(["start", "--force", "--template", "nope", "x"])
        .assert()
        .code(6);
}

#[test]
fn test_templates_and_presets() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .arg("templates")
        .assert()
        .success()
        .stdout(predicate::str::contains("tdd"))
        .stdout(predicate::str::contains("refactor"))
        .stdout(predicate::str::contains("preset: rust"))
        .stdout(predicate::str::contains("preset: none"));

    loopwright(&temp)
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("cargo test"))
        .stdout(predicate::str::contains("pytest"));
}

#[test]
fn test_config_show_uses_project_file() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".loopwright")).unwrap();
    std::fs::write(
        temp.path().join(".loopwright/config.toml"),
        "[git]\ncommit_prefix = \"wright\"\n",
    )
    .unwrap();

    loopwright(&temp)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("commit_prefix = \"wright\""));
}

#[test]
fn test_invalid_config_exit_code() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".loopwright")).unwrap();
    std::fs::write(
        temp.path().join(".loopwright/config.toml"),
        "[tools]\ntimeout_secs = 0\n",
    )
    .unwrap();

    loopwright(&temp).arg("status").assert().code(7);
}

#[test]
fn test_iterate_with_unknown_preset_records_nothing() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp).args(["start", "task"]).assert().success();
    loopwright(&temp)
        .args(["iterate", "--output", "x", "--preset", "cobol"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Unknown tool preset: cobol"));

    assert!(!history_path(&temp).exists());
    let raw = std::fs::read_to_string(snapshot_path(&temp)).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["iteration"], 1);
}

#[test]
fn test_log_json_writes_structured_logs() {
    let temp = TempDir::new().unwrap();

    loopwright(&temp)
        .args(["--log-json", "start", "task"])
        .assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"INFO\""))
        .stderr(predicate::str::contains("Started loop"));
}
