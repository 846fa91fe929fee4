//! End-to-end install/update/uninstall flow against a temporary state root.
//!
//! No scheduled jobs are declared, so the flow never touches the gateway.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn aviary() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aviary"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write a minimal formation (one agent, one scoped binding) to `dir`.
fn write_formation(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("agents/greeter")).unwrap();
    std::fs::write(
        dir.join("formation.yaml"),
        r#"
namespace: demo
name: hello
version: "1.0.0"
agents:
  greeter:
    source: agents/greeter
bindings:
  - agent: greeter
    match:
      channel: slack
      peer: "C042"
"#,
    )
    .unwrap();
    std::fs::write(dir.join("agents/greeter/SOUL.md"), "Say hello.\n").unwrap();
}

#[test]
fn test_install_list_noop_update_uninstall_roundtrip() {
    let home = tempfile::tempdir().expect("tempdir");
    let source = tempfile::tempdir().expect("tempdir");
    write_formation(source.path());

    // Install.
    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["install", source.path().to_str().unwrap(), "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("installed"));

    // State record exists under the collision-free name.
    assert!(home.path().join("formations/demo__hello.json").exists());

    // Host config: default agent seeded at index 0, agent and binding wired.
    let config: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(home.path().join("aviary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(config["agents"]["list"][0]["id"], "main");
    assert_eq!(config["agents"]["list"][1]["id"], "demo-greeter");
    assert_eq!(config["bindings"][0]["agentId"], "demo-greeter");

    // Workspace file deployed.
    assert!(home
        .path()
        .join("workspaces/demo-greeter/SOUL.md")
        .exists());

    // List shows it.
    aviary()
        .env("AVIARY_HOME", home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/hello"));

    // A no-op update reports an empty plan.
    aviary()
        .env("AVIARY_HOME", home.path())
        .args([
            "update",
            source.path().to_str().unwrap(),
            "--dry-run",
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"));

    // Uninstall removes everything.
    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["uninstall", "demo/hello", "--yes"])
        .assert()
        .success();
    assert!(!home.path().join("formations/demo__hello.json").exists());
    assert!(!home.path().join("workspaces/demo-greeter").exists());
}

#[test]
fn test_second_install_without_force_is_a_conflict() {
    let home = tempfile::tempdir().expect("tempdir");
    let source = tempfile::tempdir().expect("tempdir");
    write_formation(source.path());

    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["install", source.path().to_str().unwrap(), "--yes"])
        .assert()
        .success();

    aviary()
        .env("AVIARY_HOME", home.path())
        .args(["install", source.path().to_str().unwrap(), "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_dry_run_touches_nothing() {
    let home = tempfile::tempdir().expect("tempdir");
    let source = tempfile::tempdir().expect("tempdir");
    write_formation(source.path());

    aviary()
        .env("AVIARY_HOME", home.path())
        .args([
            "install",
            source.path().to_str().unwrap(),
            "--dry-run",
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo-greeter"));

    assert!(!home.path().join("formations/demo__hello.json").exists());
    assert!(!home.path().join("aviary.json").exists());
    assert!(!home.path().join("workspaces").exists());
}
