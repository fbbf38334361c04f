//! CLI subprocess integration tests.
//!
//! These run the `kibitz` binary against the built-in mock engine and check
//! exit codes, stdout content, and JSON output shape.

use std::process::{Command, Output};

fn kibitz_bin(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kibitz"));
    // Keep the user's own settings file and engine override out of the way.
    cmd.env("HOME", home);
    cmd.env_remove("KIBITZ_ENGINE");
    cmd.env_remove("KIBITZ_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    let home = tempfile::tempdir().unwrap();
    kibitz_bin(home.path()).args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("kibitz"));
}

#[test]
fn cli_presets_json_lists_builtins() {
    let output = run(&["presets", "--json"]);
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"default"));
    assert!(names.contains(&"mobile"));
    assert!(names.contains(&"prewarm"));
}

#[test]
fn cli_eval_with_mock_engine() {
    let output = run(&["--engine", "mock", "eval", "startpos", "--depth", "3", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let eval: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(eval["best_move"], "e2e4");
    assert_eq!(eval["ponder"], "e7e5");
    assert_eq!(eval["depth"], 3);
    assert_eq!(eval["evaluation"]["score"]["kind"], "centipawns");
    assert_eq!(eval["evaluation"]["score"]["value"], 13);
    assert_eq!(eval["evaluation"]["side"], "white");
}

#[test]
fn cli_analyze_streams_until_bestmove() {
    let output = run(&["--engine", "mock", "analyze", "startpos", "--depth", "2"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("depth  2"));
    assert!(text.trim_end().ends_with("bestmove e2e4 ponder e7e5"));
}

#[test]
fn cli_analyze_json_is_one_event_per_line() {
    let output = run(&[
        "--engine", "mock", "--json", "analyze", "startpos", "--moves", "e2e4", "--depth", "2",
    ]);
    assert!(output.status.success());
    let events: Vec<serde_json::Value> = stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "principal_variation");
    assert_eq!(events[0]["evaluation"]["side"], "black");
    assert_eq!(events[2]["type"], "best_move");
    assert_eq!(events[2]["best"], "e2e4");
}

#[test]
fn cli_unknown_preset_is_settings_error() {
    let output = run(&["--engine", "mock", "analyze", "startpos", "--preset", "bullet"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown analysis preset"));
}

#[test]
fn cli_invalid_settings_file_is_settings_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kibitz.toml");
    std::fs::write(&path, "[engine]\nbinary = \"sf\"\n").unwrap();

    let output = kibitz_bin(dir.path())
        .args(["--config", path.to_str().unwrap(), "eval", "startpos"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_settings_file_selects_mock_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kibitz.toml");
    std::fs::write(&path, "[engine]\nbackend = \"mock\"\n\n[analysis]\npreset = \"quick-eval\"\n").unwrap();

    let output = kibitz_bin(dir.path())
        .args(["--config", path.to_str().unwrap(), "--json", "eval", "startpos", "--depth", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn cli_missing_engine_is_unavailable() {
    let output = run(&["--engine", "/nonexistent/kibitz-engine", "eval", "startpos"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("engine unavailable"));
}

#[test]
fn cli_doctor_json_with_mock_engine() {
    let output = run(&["--engine", "mock", "doctor", "--json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["healthy"], true);
    let handshake = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "engine_handshake")
        .unwrap();
    assert_eq!(handshake["status"], "pass");
    assert!(handshake["message"].as_str().unwrap().contains("kibitz-mock"));
}

#[test]
fn cli_doctor_reports_missing_engine() {
    let output = run(&["--engine", "/nonexistent/kibitz-engine", "doctor"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Some checks failed"));
}

#[test]
fn cli_completions_bash() {
    let output = run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("kibitz"));
}
