//! Integration tests for rigup
//!
//! These tests drive the CLI end to end against real plan files and real
//! (tiny) shell commands.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a rigup Command
fn rigup() -> Command {
    cargo_bin_cmd!("rigup")
}

fn write_plan(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const ECHO_PLAN: &str = r#"{
  "operations": [
    {
      "id": "clone",
      "kind": "repository-clone",
      "name": "Clone repository",
      "command": "/bin/sh",
      "args": ["-c", "echo 'Receiving objects: 100%'"]
    },
    {
      "id": "install",
      "kind": "dependency-install",
      "name": "Install dependencies",
      "command": "/bin/sh",
      "args": ["-c", "echo install-done"],
      "depends_on": ["clone"]
    }
  ]
}"#;

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        rigup().arg("--help").assert().success();
    }

    #[test]
    fn test_kinds_lists_closed_set() {
        rigup()
            .arg("kinds")
            .assert()
            .success()
            .stdout(predicate::str::contains("repository-clone"))
            .stdout(predicate::str::contains("container-image-build"))
            .stdout(predicate::str::contains("custom-script"));
    }
}

mod validate {
    use super::*;

    #[test]
    fn test_validate_accepts_good_plan() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir, "plan.json", ECHO_PLAN);

        rigup()
            .arg("validate")
            .arg(&plan)
            .assert()
            .success()
            .stdout(predicate::str::contains("2 operations"))
            .stdout(predicate::str::contains("after clone"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(
            &dir,
            "plan.json",
            r#"{
              "operations": [
                {"id": "a", "kind": "custom-script", "name": "a", "command": "true", "depends_on": ["b"]},
                {"id": "b", "kind": "custom-script", "name": "b", "command": "true", "depends_on": ["a"]}
              ]
            }"#,
        );

        rigup()
            .arg("validate")
            .arg(&plan)
            .assert()
            .failure()
            .stderr(predicate::str::contains("cycle").or(predicate::str::contains("Cycle")));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(
            &dir,
            "plan.json",
            r#"{
              "operations": [
                {"id": "a", "kind": "custom-script", "name": "a", "command": "true", "depends_on": ["ghost"]}
              ]
            }"#,
        );

        rigup()
            .arg("validate")
            .arg(&plan)
            .assert()
            .failure()
            .stderr(predicate::str::contains("ghost"));
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        rigup()
            .arg("validate")
            .arg(dir.path().join("nope.json"))
            .assert()
            .failure();
    }
}

mod run {
    use super::*;

    #[test]
    fn test_run_succeeds_and_reports_summary() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir, "plan.json", ECHO_PLAN);

        rigup()
            .current_dir(dir.path())
            .arg("run")
            .arg(&plan)
            .arg("--yes")
            .assert()
            .success()
            .stdout(predicate::str::contains("2"))
            .stdout(predicate::str::contains("succeeded"));
    }

    #[test]
    fn test_run_exports_json_log() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir, "plan.json", ECHO_PLAN);
        let out = dir.path().join("log.json");

        rigup()
            .current_dir(dir.path())
            .arg("run")
            .arg(&plan)
            .arg("--yes")
            .arg("--export")
            .arg("json")
            .arg("--out")
            .arg(&out)
            .assert()
            .success();

        let content = fs::read_to_string(&out).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&content).unwrap();
        let entries = entries.as_array().unwrap();
        assert!(!entries.is_empty());

        // both operations started and completed, in chronological order
        let kinds: Vec<&str> = entries
            .iter()
            .map(|e| e["kind"].as_str().unwrap())
            .collect();
        assert!(kinds.contains(&"started"));
        assert!(kinds.contains(&"completed"));
        assert!(kinds.contains(&"console"));

        let started_ops: Vec<&str> = entries
            .iter()
            .filter(|e| e["kind"] == "started")
            .map(|e| e["operationId"].as_str().unwrap())
            .collect();
        assert_eq!(started_ops, vec!["clone", "install"]);
    }

    #[test]
    fn test_run_fails_on_nonzero_exit_with_yes() {
        let dir = TempDir::new().unwrap();
        // --yes retries once, then skips; a skipped-only run is not a success
        let plan = write_plan(
            &dir,
            "plan.json",
            r#"{
              "operations": [
                {"id": "bad", "kind": "custom-script", "name": "bad", "command": "/bin/sh", "args": ["-c", "exit 1"]}
              ]
            }"#,
        );

        rigup()
            .current_dir(dir.path())
            .arg("run")
            .arg(&plan)
            .arg("--yes")
            .assert()
            .failure()
            .stderr(predicate::str::contains("did not complete successfully"));
    }

    #[test]
    fn test_run_export_plain_text_format() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir, "plan.json", ECHO_PLAN);
        let out = dir.path().join("log.txt");

        rigup()
            .current_dir(dir.path())
            .arg("run")
            .arg(&plan)
            .arg("--yes")
            .arg("--export")
            .arg("plain-text")
            .arg("--out")
            .arg(&out)
            .assert()
            .success();

        let content = fs::read_to_string(&out).unwrap();
        assert!(content.lines().any(|l| l.contains("[clone]")));
        assert!(content.lines().any(|l| l.contains("[install]")));
        // every line carries the bracketed ISO timestamp prefix
        assert!(content.lines().all(|l| l.starts_with('[')));
    }
}
