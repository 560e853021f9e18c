//! Exit codes and output streams of the command-line shell.

use std::process::{Command, Output};

fn export(args: &[&str]) -> Output {
    let data = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_lean-daily-export"))
        .args(args)
        .env("LEAN_DATA_DIR", data.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn no_arguments_print_usage_and_exit_1() {
    let out = export(&[]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout.starts_with("Usage:"), "{stdout}");
}

#[test]
fn bad_date_prints_usage_and_reason_without_fetching() {
    let out = export(&["AAPL", "2023/01/01", "2023-01-03"]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout.starts_with("Usage:"), "{stdout}");
    assert!(stdout.contains("invalid start_date"), "{stdout}");
    assert!(!stdout.contains("Downloading"), "{stdout}");
}

#[test]
fn help_exits_0() {
    let out = export(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("<SYMBOL>"));
}
