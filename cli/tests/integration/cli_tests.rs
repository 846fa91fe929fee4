//! CLI surface tests — help, version, argument errors.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn aviary() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aviary"));
    cmd.env("NO_COLOR", "1");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_nonzero() {
    // clap with arg_required_else_help shows help on stderr and exits 2
    aviary().assert().code(2).stderr(predicate::str::contains(
        "Package manager for AI agent formations",
    ));
}

#[test]
fn test_cli_help_flag_shows_help() {
    aviary()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_version_command_shows_version() {
    aviary()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("aviary 0.3.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    aviary()
        .arg("version")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""version": "0.3.0""#));
}

// --- Command hierarchy tests ---

#[test]
fn test_help_shows_core_commands() {
    for command in ["install", "update", "uninstall", "repair", "list", "export"] {
        aviary()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(command));
    }
}

// --- Argument errors ---

#[test]
fn test_install_with_missing_path_fails() {
    let home = tempfile::tempdir().expect("tempdir");
    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["install", "/definitely/not/a/path", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_uninstall_rejects_malformed_reference() {
    let home = tempfile::tempdir().expect("tempdir");
    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["uninstall", "not-a-ref", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected <namespace>/<name>"));
}

#[test]
fn test_repair_unknown_formation_fails_with_hint() {
    let home = tempfile::tempdir().expect("tempdir");
    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["repair", "ghost/formation"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"));
}
