//! The build engine hosted inside an isolated context.
//!
//! A [`BuildEngine`] is bound to one toolchain for its whole life. It owns a
//! scratch directory that command tasks use as their temp and default working
//! directory; [`BuildEngine::dispose`] releases it.

pub mod cmd;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DomainConfig;
use crate::consts::APP_NAME;
use crate::task::TaskError;
use crate::toolchain::ToolchainVersion;

use self::cmd::{CmdSpec, execute_cmd};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("failed to create engine scratch directory: {0}")]
  Scratch(#[source] io::Error),
}

#[derive(Debug)]
pub struct BuildEngine {
  version: ToolchainVersion,
  config: DomainConfig,
  allow_redirects: bool,
  /// Variables exported to command tasks on top of the config env.
  toolchain_env: BTreeMap<String, String>,
  vars: BTreeMap<String, i64>,
  scratch: TempDir,
  tasks_run: u64,
}

impl BuildEngine {
  pub fn new(version: ToolchainVersion, config: &DomainConfig, allow_redirects: bool) -> Result<Self, EngineError> {
    if config.toolchain != version {
      warn!(
        engine = %version,
        config = %config.toolchain,
        "engine toolchain differs from the loaded config"
      );
    }

    let scratch = tempfile::Builder::new()
      .prefix(&format!("{}-{}-", APP_NAME, version))
      .tempdir()
      .map_err(EngineError::Scratch)?;

    let mut toolchain_env = BTreeMap::new();
    toolchain_env.insert("TOOLCHAIN".to_string(), version.to_string());
    toolchain_env.insert("TOOLCHAIN_RUNTIME".to_string(), config.runtime.clone());

    info!(version = %version, runtime = %config.runtime, scratch = %scratch.path().display(), "build engine created");

    Ok(Self {
      version,
      config: config.clone(),
      allow_redirects,
      toolchain_env,
      vars: BTreeMap::new(),
      scratch,
      tasks_run: 0,
    })
  }

  pub fn version(&self) -> ToolchainVersion {
    self.version
  }

  pub fn scratch_dir(&self) -> &Path {
    self.scratch.path()
  }

  /// Number of tasks that have started on this engine.
  pub fn tasks_run(&self) -> u64 {
    self.tasks_run
  }

  pub(crate) fn record_task(&mut self) {
    self.tasks_run += 1;
  }

  pub fn set_var(&mut self, key: &str, value: i64) {
    self.vars.insert(key.to_string(), value);
  }

  pub fn var(&self, key: &str) -> Option<i64> {
    self.vars.get(key).copied()
  }

  /// Resolve the version a component binds to under this engine.
  ///
  /// Redirects from the config apply only when the domain allows them;
  /// otherwise the requested version stands.
  pub fn resolve_component<'a>(&'a self, component: &str, requested: &'a str) -> &'a str {
    if self.allow_redirects
      && let Some(target) = self.config.redirects.get(component)
    {
      if target != requested {
        debug!(component, requested, target = %target, "redirecting component binding");
      }
      return target;
    }
    requested
  }

  /// Run a shell command in the engine's isolated environment.
  pub fn run_cmd(&self, cmd: &str, env: &BTreeMap<String, String>, cwd: Option<&Path>) -> Result<i64, TaskError> {
    let cwd: PathBuf = match cwd {
      Some(dir) if dir.is_absolute() => dir.to_path_buf(),
      Some(dir) => self.scratch.path().join(dir),
      None => self.scratch.path().to_path_buf(),
    };

    execute_cmd(&CmdSpec {
      cmd,
      env: vec![&self.config.env, &self.toolchain_env, env],
      cwd: &cwd,
      tmp_dir: self.scratch.path(),
      shell: self.config.shell.as_deref(),
    })
  }

  /// Shut the engine down and release its scratch directory.
  pub fn dispose(self) {
    let scratch = self.scratch.path().to_path_buf();
    if let Err(err) = self.scratch.close() {
      warn!(error = %err, path = %scratch.display(), "failed to remove engine scratch directory");
    }
    info!(version = %self.version, tasks_run = self.tasks_run, "build engine disposed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::domain_config as config;

  #[test]
  fn redirects_apply_only_when_allowed() {
    let cfg = config(ToolchainVersion::V40);
    let permissive = BuildEngine::new(ToolchainVersion::V40, &cfg, true).unwrap();
    let strict = BuildEngine::new(ToolchainVersion::V40, &cfg, false).unwrap();

    assert_eq!(permissive.resolve_component("build-framework", "3.5.0"), "4.0.0");
    assert_eq!(strict.resolve_component("build-framework", "3.5.0"), "3.5.0");
    assert_eq!(permissive.resolve_component("unlisted", "1.2.3"), "1.2.3");
  }

  #[test]
  fn vars_start_empty() {
    let mut engine = BuildEngine::new(ToolchainVersion::V20, &config(ToolchainVersion::V20), true).unwrap();
    assert_eq!(engine.var("x"), None);
    engine.set_var("x", 7);
    assert_eq!(engine.var("x"), Some(7));
  }

  #[test]
  fn dispose_removes_scratch_dir() {
    let engine = BuildEngine::new(ToolchainVersion::V35, &config(ToolchainVersion::V35), true).unwrap();
    let scratch = engine.scratch_dir().to_path_buf();
    assert!(scratch.is_dir());

    engine.dispose();

    assert!(!scratch.exists());
  }

  #[test]
  #[cfg(unix)]
  fn commands_see_toolchain_env() {
    let engine = BuildEngine::new(ToolchainVersion::V40, &config(ToolchainVersion::V40), true).unwrap();
    let cmd = r#"test "$TOOLCHAIN" = "v40" && test "$TOOLCHAIN_RUNTIME" = "4.0.30319" && test "$PATH" = "/usr/bin:/bin""#;
    assert_eq!(engine.run_cmd(cmd, &BTreeMap::new(), None).unwrap(), 0);
  }

  #[test]
  #[cfg(unix)]
  fn relative_cwd_is_inside_scratch() {
    let engine = BuildEngine::new(ToolchainVersion::V40, &config(ToolchainVersion::V40), true).unwrap();
    std::fs::create_dir(engine.scratch_dir().join("obj")).unwrap();

    engine
      .run_cmd(": > built", &BTreeMap::new(), Some(Path::new("obj")))
      .unwrap();

    assert!(engine.scratch_dir().join("obj").join("built").exists());
  }
}
