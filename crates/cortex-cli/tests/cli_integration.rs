//! Integration tests that run the `cortex` binary on the demo programs.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn demos_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
}

fn demo(name: &str) -> String {
    demos_dir().join(name).display().to_string()
}

fn cortex(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cortex"))
        .args(args)
        .output()
        .expect("failed to run cortex")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn all_demos_parse() {
    let mut files: Vec<_> = fs::read_dir(demos_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |e| e == "cas"))
        .collect();
    files.sort();
    assert!(!files.is_empty(), "no .cas files in demos");
    for file in &files {
        let output = cortex(&["parse", &file.display().to_string()]);
        assert!(output.status.success(), "{}: {}", file.display(), String::from_utf8_lossy(&output.stderr));
        assert!(stdout(&output).contains("parse: ok"));
    }
}

#[test]
fn check_sign_is_ok() {
    let output = cortex(&["check", &demo("sign.cas")]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Result: OK"), "{out}");
    assert!(out.contains("Paths: 2 (0 pruned, 0 revisited)"), "{out}");
}

#[test]
fn check_sign_prints_path_conditions() {
    let output = cortex(&["check", "--paths", &demo("sign.cas")]);
    let out = stdout(&output);
    assert!(out.contains("path 1: completed"), "{out}");
    assert!(out.contains("path 2: completed"), "{out}");
}

#[test]
fn check_divide_reports_arithmetic_exception() {
    let output = cortex(&["check", &demo("divide.cas")]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Result: ERRORS FOUND"), "{out}");
    assert!(out.contains("uncaught ArithmeticException"), "{out}");
}

#[test]
fn check_deadlock_stops_on_error() {
    let output = cortex(&["check", "--stop-on-error", &demo("deadlock.cas")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("deadlock"));
}

#[test]
fn check_synchronized_counter_is_ok() {
    let output = cortex(&["check", &demo("synchronized_counter.cas")]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn state_limit_exits_with_two() {
    let output = cortex(&["check", "--max-states", "2", &demo("racy_counter.cas")]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).contains("STATE LIMIT REACHED"));
}

#[test]
fn replay_follows_a_trace() {
    let output = cortex(&["replay", &demo("sign.cas"), "0,1"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Replayed 2 choices"), "{out}");
    assert!(out.contains("End: completed"), "{out}");

    let output = cortex(&["replay", &demo("sign.cas"), "0,5"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn replay_rejects_malformed_trace() {
    let output = cortex(&["replay", &demo("sign.cas"), "0,x"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn format_is_idempotent() {
    let first = cortex(&["format", &demo("list_sum.cas")]);
    assert!(first.status.success());
    let formatted = stdout(&first);

    let path = std::env::temp_dir().join(format!("cortex-format-{}.cas", std::process::id()));
    fs::write(&path, &formatted).unwrap();
    let second = cortex(&["format", &path.display().to_string()]);
    fs::remove_file(&path).ok();
    assert_eq!(stdout(&second), formatted);
}

#[test]
fn load_errors_fail() {
    let path = std::env::temp_dir().join(format!("cortex-bad-{}.cas", std::process::id()));
    fs::write(&path, "class A {\n    static method f() {\n        frobnicate\n    }\n}\n").unwrap();
    let output = cortex(&["check", &path.display().to_string()]);
    fs::remove_file(&path).ok();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown instruction"));
}
