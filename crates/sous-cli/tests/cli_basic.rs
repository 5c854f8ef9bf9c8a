//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run with HOME pointed at a scratch
//! directory, so each test gets its own config and database.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "sous-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("SOUS_ENV")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_timer_start_pause_resume() {
    let home = TempDir::new().unwrap();
    let started = run_json(
        home.path(),
        &["timer", "start", "--duration", "600", "--name", "rice", "--recipe-id", "r-1"],
    );
    assert_eq!(started["type"], "TimerStarted");
    let id = started["id"].as_str().unwrap().to_string();

    let paused = run_json(home.path(), &["timer", "pause", &id]);
    assert_eq!(paused["type"], "TimerPaused");

    let resumed = run_json(home.path(), &["timer", "resume", &id]);
    assert_eq!(resumed["type"], "TimerResumed");

    let status = run_json(home.path(), &["timer", "status", &id]);
    assert_eq!(status["timer"]["state"], "ACTIVE");
    assert_eq!(status["expired"], false);
    assert!(status["remainingSecs"].as_u64().unwrap() <= 600);
}

#[test]
fn test_timer_cap_rejects_second_start() {
    let home = TempDir::new().unwrap();
    run_json(home.path(), &["timer", "start", "--duration", "60"]);

    let (_, stderr, code) = run_cli(home.path(), &["timer", "start", "--duration", "60"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("may run at a time"), "unexpected stderr: {stderr}");

    let timers = run_json(home.path(), &["timer", "list"]);
    assert_eq!(timers.as_array().unwrap().len(), 1);
}

#[test]
fn test_timer_recent_durations() {
    let home = TempDir::new().unwrap();
    run_json(home.path(), &["timer", "create", "--duration", "300"]);
    run_json(home.path(), &["timer", "create", "--duration", "90"]);

    let recent = run_json(home.path(), &["timer", "recent"]);
    assert_eq!(recent, serde_json::json!([90, 300]));
}

#[test]
fn test_unknown_timer_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["timer", "pause", "missing"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("timer not found"));
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "timers.max_active"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "timers.max_active", "2"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "timers.max_active"]);
    assert_eq!(stdout.trim(), "2");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "timers.bogus", "2"]);
    assert_ne!(code, 0);
}

#[test]
fn test_auth_login_status_logout() {
    let home = TempDir::new().unwrap();
    let status = run_json(home.path(), &["auth", "status"]);
    assert_eq!(status["signedIn"], false);

    let (_, _, code) = run_cli(
        home.path(),
        &["auth", "login", "--access", "a1", "--refresh", "r1"],
    );
    assert_eq!(code, 0);
    let status = run_json(home.path(), &["auth", "status"]);
    assert_eq!(status["signedIn"], true);
    assert_eq!(status["hasRefreshToken"], true);

    let (_, _, code) = run_cli(home.path(), &["auth", "logout"]);
    assert_eq!(code, 0);
    assert_eq!(run_json(home.path(), &["auth", "status"])["signedIn"], false);
}

#[test]
fn test_bridge_inspect() {
    let home = TempDir::new().unwrap();
    let shape = run_json(
        home.path(),
        &[
            "bridge",
            "inspect",
            r#"{"intended":true,"action":"RESPONSE","mode":"BLOCKING","id":"1","ok":true,"result":5}"#,
        ],
    );
    assert_eq!(shape["kind"], "response");
    assert_eq!(shape["result"], 5);

    let shape = run_json(home.path(), &["bridge", "inspect", r#"{"source":"devtools"}"#]);
    assert_eq!(shape["reason"], "foreign");
}
