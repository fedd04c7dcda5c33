//! CLI smoke tests for isobuild.
//!
//! Every command runs against a private config directory. `run` spawns real
//! domains served by the binary's own hidden `worker` subcommand.

use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the isobuild binary, isolated to `temp`.
fn iso_cmd(temp: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("isobuild");
  cmd
    .current_dir(temp.path())
    .env("ISOBUILD_CONFIG_DIR", temp.path().join("configs"))
    .env_remove("ISOBUILD_WORKER")
    .env_remove("RUST_LOG");
  cmd
}

fn write_tasks(dir: &Path, json: &str) -> String {
  let path = dir.join("tasks.json");
  std::fs::write(&path, json).unwrap();
  path.display().to_string()
}

const COMPILE_AND_LINK: &str = r#"[
  {"kind": "constant", "value": 2, "label": "compile"},
  {"kind": "constant", "value": 3, "label": "link"}
]"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  iso_cmd(&temp)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"))
    .stdout(predicate::str::contains("worker").not());
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  iso_cmd(&temp)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("isobuild"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["run", "versions", "config", "clean"] {
    iso_cmd(&temp)
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// versions
// =============================================================================

#[test]
fn versions_lists_every_toolchain() {
  let temp = TempDir::new().unwrap();
  iso_cmd(&temp)
    .arg("versions")
    .assert()
    .success()
    .stdout(predicate::str::contains("v20"))
    .stdout(predicate::str::contains("v30"))
    .stdout(predicate::str::contains("v35"))
    .stdout(predicate::str::contains("v40"))
    .stdout(predicate::str::contains("4.0.30319"));
}

#[test]
fn versions_json_is_parseable() {
  let temp = TempDir::new().unwrap();
  let out = iso_cmd(&temp).args(["versions", "--json"]).output().unwrap();
  assert!(out.status.success());

  let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  let versions = value.as_array().unwrap();
  assert_eq!(versions.len(), 4);
  assert_eq!(versions[3]["toolchain"], "v40");
}

// =============================================================================
// run
// =============================================================================

#[test]
fn run_prints_the_batch_total() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(temp.path(), COMPILE_AND_LINK);

  iso_cmd(&temp)
    .args(["run", &tasks, "--toolchain", "v40"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Run 1: 5"))
    .stdout(predicate::str::contains("isobuild.v40"));
}

#[test]
fn run_repeat_reuses_the_domain() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(temp.path(), COMPILE_AND_LINK);

  let out = iso_cmd(&temp)
    .args(["run", &tasks, "--toolchain", "v35", "--repeat", "2", "--json"])
    .output()
    .unwrap();
  assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

  let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(report["toolchain"], "v35");
  assert_eq!(report["identity"], "isobuild.v35");
  assert_eq!(report["tasks"], 2);
  assert_eq!(report["totals"], serde_json::json!([5, 5]));
}

#[test]
fn run_materializes_the_config() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(temp.path(), "[]");

  iso_cmd(&temp)
    .args(["run", &tasks, "--toolchain", "v30"])
    .assert()
    .success();

  assert!(temp.path().join("configs").join("isobuild.v30.json").exists());
}

#[test]
fn run_unknown_toolchain_fails() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(temp.path(), COMPILE_AND_LINK);

  iso_cmd(&temp)
    .args(["run", &tasks, "--toolchain", "v99"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("v99"));
}

#[test]
fn run_failing_task_fails() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(
    temp.path(),
    r#"[{"kind": "constant", "value": 1}, {"kind": "fail", "message": "linker exploded"}]"#,
  );

  iso_cmd(&temp)
    .args(["run", &tasks])
    .assert()
    .failure()
    .stderr(predicate::str::contains("linker exploded"));
}

#[test]
fn run_missing_tasks_file_fails() {
  let temp = TempDir::new().unwrap();

  iso_cmd(&temp)
    .args(["run", "nope.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn run_writes_domain_diagnostics_to_log_file() {
  let temp = TempDir::new().unwrap();
  let tasks = write_tasks(temp.path(), COMPILE_AND_LINK);
  let log = temp.path().join("isobuild.log");

  iso_cmd(&temp)
    .args(["run", &tasks, "-vv", "--log-file"])
    .arg(&log)
    .assert()
    .success();

  let content = std::fs::read_to_string(&log).unwrap();
  assert!(content.contains("domain ready"), "{content}");
  assert!(content.contains("build engine created"), "{content}");
}

// =============================================================================
// config & clean
// =============================================================================

#[test]
fn config_prints_materialized_path() {
  let temp = TempDir::new().unwrap();

  iso_cmd(&temp)
    .args(["config", "v35"])
    .assert()
    .success()
    .stdout(predicate::str::contains("isobuild.v35.json"));

  assert!(temp.path().join("configs").join("isobuild.v35.json").exists());
}

#[test]
fn config_print_shows_content() {
  let temp = TempDir::new().unwrap();

  iso_cmd(&temp)
    .args(["config", "v20", "--print"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"toolchain\""))
    .stdout(predicate::str::contains("v20"));
}

#[test]
fn clean_removes_materialized_configs() {
  let temp = TempDir::new().unwrap();
  iso_cmd(&temp).args(["config", "v20"]).assert().success();
  iso_cmd(&temp).args(["config", "v40"]).assert().success();

  iso_cmd(&temp)
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 2"));

  iso_cmd(&temp)
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to clean"));
}

// =============================================================================
// worker
// =============================================================================

#[test]
fn worker_rejects_requests_before_init() {
  let temp = TempDir::new().unwrap();

  iso_cmd(&temp)
    .arg("worker")
    .write_stdin("{\"op\":\"dispose\"}\n")
    .assert()
    .failure()
    .stdout(predicate::str::contains("\"kind\":\"protocol\""));
}

#[test]
fn worker_exits_cleanly_on_hangup() {
  let temp = TempDir::new().unwrap();

  iso_cmd(&temp).arg("worker").write_stdin("").assert().success();
}
