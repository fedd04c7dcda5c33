//! Command execution for `cmd` tasks.
//!
//! Commands run with an isolated environment, following Nix-inspired
//! principles: nothing from the worker's own environment leaks in except what
//! the toolchain config and the task declare.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::task::TaskError;

/// Inputs for a single command run.
#[derive(Debug)]
pub struct CmdSpec<'a> {
  pub cmd: &'a str,
  /// Variables layered over the isolated base environment, in order.
  pub env: Vec<&'a BTreeMap<String, String>>,
  pub cwd: &'a Path,
  pub tmp_dir: &'a Path,
  pub shell: Option<&'a str>,
}

/// Execute a command and return its exit code.
///
/// The environment is cleared, then:
/// - PATH is set to /path-not-set (overridable by the layered env)
/// - HOME is set to /homeless-shelter
/// - TMPDIR/TMP/TEMP/TEMPDIR point at the engine's scratch directory
/// - LANG/LC_ALL are set to C
/// - SOURCE_DATE_EPOCH is fixed for reproducible timestamps
///
/// A non-zero exit is a result, not an error. Failing to spawn, or the process
/// dying from a signal, is an error.
pub fn execute_cmd(spec: &CmdSpec<'_>) -> Result<i64, TaskError> {
  info!(cmd = %spec.cmd, "executing command");

  let (shell_cmd, shell_args) = get_shell(spec.shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(spec.cmd)
    .current_dir(spec.cwd)
    .env_clear()
    .env("PATH", "/path-not-set")
    .env("HOME", "/homeless-shelter")
    .env("TMPDIR", spec.tmp_dir)
    .env("TMP", spec.tmp_dir)
    .env("TEMP", spec.tmp_dir)
    .env("TEMPDIR", spec.tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    // 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch)
    .env("SOURCE_DATE_EPOCH", "315532800");

  for layer in &spec.env {
    for (key, value) in layer.iter() {
      command.env(key, value);
    }
  }

  debug!(shell = %shell_cmd, working_dir = ?spec.cwd, "spawning process");

  let output = command.output().map_err(|source| TaskError::Spawn {
    cmd: spec.cmd.to_string(),
    source,
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  if !stdout.trim().is_empty() {
    debug!(stdout = %stdout.trim(), "command stdout");
  }
  if !stderr.trim().is_empty() {
    debug!(stderr = %stderr.trim(), "command stderr");
  }

  match output.status.code() {
    Some(code) => {
      if code != 0 {
        info!(cmd = %spec.cmd, code, "command exited with non-zero status");
      }
      Ok(i64::from(code))
    }
    None => Err(TaskError::Terminated {
      cmd: spec.cmd.to_string(),
    }),
  }
}

/// Get the shell command and arguments for the current platform.
///
/// Without an override this is always `/bin/sh` (Unix) or `powershell.exe`
/// (Windows), never `$SHELL`: interactive shells may source profile files that
/// modify the environment and break isolation.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
