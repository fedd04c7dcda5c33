//! Build tasks dispatched into a domain.
//!
//! The domain never looks inside a task: it only hands the task its engine
//! and collects the integer the task produces. [`Task`] is the closed set of
//! task kinds that can travel to a worker process.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::engine::BuildEngine;

/// A unit of work executed against an engine, yielding an integer outcome.
pub trait BuildTask {
  fn perform(&self, engine: &mut BuildEngine) -> Result<i64, TaskError>;
}

/// Errors a task can fail with.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error("failed to spawn `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: io::Error,
  },

  /// The command was killed by a signal before it could exit.
  #[error("command terminated by signal: {cmd}")]
  Terminated { cmd: String },

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("component {component} resolved to unparseable version {version}")]
  InvalidVersion { component: String, version: String },

  /// Adding this task's result to the running total overflowed.
  #[error("task result total overflowed")]
  Overflow,

  #[error("{0}")]
  Failed(String),
}

/// Task kinds understood by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
  /// Returns a fixed value.
  Constant {
    value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
  },

  /// Runs a shell command; the result is its exit code.
  Cmd {
    cmd: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<PathBuf>,
  },

  /// Stores a value in engine state and returns it.
  Set { key: String, value: i64 },

  /// Returns the stored value, or 0 when unset.
  Get { key: String },

  /// Creates (or truncates) a marker file and returns 0.
  Touch { path: PathBuf },

  /// Resolves a component through the engine's binding policy and returns
  /// the major version it binds to.
  Probe { component: String, requested: String },

  /// Always fails with the given message.
  Fail { message: String },
}

impl Task {
  pub fn constant(value: i64) -> Self {
    Task::Constant { value, label: None }
  }

  pub fn labeled(label: &str, value: i64) -> Self {
    Task::Constant {
      value,
      label: Some(label.to_string()),
    }
  }

  pub fn cmd(cmd: &str) -> Self {
    Task::Cmd {
      cmd: cmd.to_string(),
      env: BTreeMap::new(),
      cwd: None,
    }
  }

  pub fn fail(message: &str) -> Self {
    Task::Fail {
      message: message.to_string(),
    }
  }

  /// Short name for diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Task::Constant { .. } => "constant",
      Task::Cmd { .. } => "cmd",
      Task::Set { .. } => "set",
      Task::Get { .. } => "get",
      Task::Touch { .. } => "touch",
      Task::Probe { .. } => "probe",
      Task::Fail { .. } => "fail",
    }
  }
}

impl BuildTask for Task {
  fn perform(&self, engine: &mut BuildEngine) -> Result<i64, TaskError> {
    match self {
      Task::Constant { value, label } => {
        if let Some(label) = label {
          debug!(label = %label, value, "constant task");
        }
        Ok(*value)
      }
      Task::Cmd { cmd, env, cwd } => engine.run_cmd(cmd, env, cwd.as_deref()),
      Task::Set { key, value } => {
        engine.set_var(key, *value);
        Ok(*value)
      }
      Task::Get { key } => Ok(engine.var(key).unwrap_or(0)),
      Task::Touch { path } => {
        std::fs::write(path, b"").map_err(|source| TaskError::Io {
          path: path.clone(),
          source,
        })?;
        Ok(0)
      }
      Task::Probe { component, requested } => {
        let resolved = engine.resolve_component(component, requested);
        major_version(resolved).ok_or_else(|| TaskError::InvalidVersion {
          component: component.clone(),
          version: resolved.to_string(),
        })
      }
      Task::Fail { message } => Err(TaskError::Failed(message.clone())),
    }
  }
}

fn major_version(version: &str) -> Option<i64> {
  version.split('.').next()?.trim().parse().ok()
}
