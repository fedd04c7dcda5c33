//! The engine owner living inside an isolated context.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, DomainConfig};
use crate::engine::{BuildEngine, EngineError};
use crate::logging::{LogFacade, LogSink, Verbosity};
use crate::protocol::{DomainSettings, Fault};
use crate::task::{BuildTask, TaskError};
use crate::toolchain::ToolchainVersion;

#[derive(Debug, Error)]
pub enum ProxyError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("task {index} failed: {source}")]
  Task {
    index: usize,
    #[source]
    source: TaskError,
  },
}

impl From<ProxyError> for Fault {
  fn from(err: ProxyError) -> Self {
    match err {
      ProxyError::Engine(e) => Fault::Engine { message: e.to_string() },
      ProxyError::Task { index, source } => Fault::Task {
        index,
        message: source.to_string(),
      },
    }
  }
}

/// Owns at most one engine per isolated context.
///
/// The engine is built on the first [`perform`](Self::perform) with whatever
/// version was last set, then reused for every later batch. The
/// check-then-create is unsynchronized; `&mut self` keeps callers serialized.
#[derive(Debug)]
pub struct RemoteEngineProxy {
  version: ToolchainVersion,
  config: DomainConfig,
  allow_redirects: bool,
  engine: Option<BuildEngine>,
  log: LogFacade,
}

impl RemoteEngineProxy {
  pub fn new(config: DomainConfig, allow_redirects: bool, log: LogFacade) -> Self {
    Self {
      version: ToolchainVersion::default(),
      config,
      allow_redirects,
      engine: None,
      log,
    }
  }

  /// Build a proxy from the settings the context was created with.
  pub fn open(settings: &DomainSettings, log: LogFacade) -> Result<Self, ConfigError> {
    let config = DomainConfig::load(&settings.config_path)?;
    debug!(config = %settings.config_path.display(), toolchain = %config.toolchain, "loaded domain config");
    Ok(Self::new(config, settings.allow_redirects, log))
  }

  pub fn version(&self) -> ToolchainVersion {
    self.version
  }

  pub fn has_engine(&self) -> bool {
    self.engine.is_some()
  }

  pub fn engine(&self) -> Option<&BuildEngine> {
    self.engine.as_ref()
  }

  /// Record the version the engine will be built with.
  ///
  /// Has no effect on an engine that already exists.
  pub fn set_version(&mut self, version: ToolchainVersion) {
    if let Some(engine) = &self.engine
      && engine.version() != version
    {
      warn!(
        engine = %engine.version(),
        requested = %version,
        "engine already exists, version change ignored until it is disposed"
      );
    }
    self.version = version;
  }

  pub fn attach_log(&mut self, sink: &LogSink, level: Verbosity) {
    self.log.attach(sink, level);
  }

  /// Run `tasks` in order against the engine and return the sum of results.
  ///
  /// The first failing task aborts the batch.
  pub fn perform<T: BuildTask>(&mut self, tasks: &[T]) -> Result<i64, ProxyError> {
    let engine = match self.engine.take() {
      Some(engine) => engine,
      None => BuildEngine::new(self.version, &self.config, self.allow_redirects)?,
    };
    let engine = self.engine.insert(engine);

    let mut total: i64 = 0;
    for (index, task) in tasks.iter().enumerate() {
      engine.record_task();
      let result = task
        .perform(engine)
        .and_then(|value| total.checked_add(value).ok_or(TaskError::Overflow))
        .map_err(|source| ProxyError::Task { index, source })?;
      total = result;
    }

    debug!(tasks = tasks.len(), total, "batch complete");
    Ok(total)
  }

  /// Dispose the engine, if any. Safe to call repeatedly.
  pub fn dispose(&mut self) {
    if let Some(engine) = self.engine.take() {
      engine.dispose();
    } else {
      debug!("no engine to dispose");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::Task;
  use crate::util::testutil;
  use std::cell::Cell;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  fn proxy() -> RemoteEngineProxy {
    RemoteEngineProxy::new(testutil::domain_config(ToolchainVersion::V40), true, LogFacade::detached())
  }

  struct Counted<'a> {
    value: i64,
    runs: &'a Cell<u32>,
  }

  impl BuildTask for Counted<'_> {
    fn perform(&self, _engine: &mut BuildEngine) -> Result<i64, TaskError> {
      self.runs.set(self.runs.get() + 1);
      if self.value < 0 {
        return Err(TaskError::Failed("negative".to_string()));
      }
      Ok(self.value)
    }
  }

  #[test]
  fn starts_with_default_version_and_no_engine() {
    let proxy = proxy();
    assert_eq!(proxy.version(), ToolchainVersion::V20);
    assert!(!proxy.has_engine());
  }

  #[test]
  fn engine_is_created_lazily_with_the_set_version() {
    let mut proxy = proxy();
    proxy.set_version(ToolchainVersion::V40);
    assert!(!proxy.has_engine());

    proxy.perform::<Task>(&[]).unwrap();

    assert_eq!(proxy.engine().unwrap().version(), ToolchainVersion::V40);
  }

  #[test]
  fn results_are_summed_in_order() {
    let mut proxy = proxy();
    let tasks = vec![Task::labeled("compile", 2), Task::labeled("link", 3)];
    assert_eq!(proxy.perform(&tasks).unwrap(), 5);
    assert_eq!(proxy.perform(&tasks).unwrap(), 5);
  }

  #[test]
  fn engine_is_reused_across_batches() {
    let mut proxy = proxy();
    proxy
      .perform(&[Task::Set {
        key: "k".to_string(),
        value: 9,
      }])
      .unwrap();
    let scratch = proxy.engine().unwrap().scratch_dir().to_path_buf();

    let value = proxy.perform(&[Task::Get { key: "k".to_string() }]).unwrap();

    assert_eq!(value, 9);
    assert_eq!(proxy.engine().unwrap().scratch_dir(), scratch);
    assert_eq!(proxy.engine().unwrap().tasks_run(), 2);
  }

  #[test]
  fn failure_aborts_remaining_tasks() {
    let mut proxy = proxy();
    let runs = Cell::new(0);
    let tasks = [
      Counted { value: 1, runs: &runs },
      Counted { value: -1, runs: &runs },
      Counted { value: 1, runs: &runs },
    ];

    let err = proxy.perform(&tasks).unwrap_err();

    assert!(matches!(err, ProxyError::Task { index: 1, .. }));
    assert_eq!(runs.get(), 2);
  }

  #[test]
  fn engine_survives_a_task_failure() {
    let mut proxy = proxy();
    proxy.perform(&[Task::fail("broken")]).unwrap_err();
    assert!(proxy.has_engine());
    assert_eq!(proxy.perform(&[Task::constant(4)]).unwrap(), 4);
  }

  #[test]
  fn overflow_is_a_task_failure() {
    let mut proxy = proxy();
    let err = proxy
      .perform(&[Task::constant(i64::MAX), Task::constant(1)])
      .unwrap_err();
    assert!(matches!(
      err,
      ProxyError::Task {
        index: 1,
        source: TaskError::Overflow
      }
    ));
  }

  #[test]
  #[traced_test]
  fn set_version_after_engine_exists_is_ignored() {
    let mut proxy = proxy();
    proxy.set_version(ToolchainVersion::V40);
    proxy.perform::<Task>(&[]).unwrap();

    proxy.set_version(ToolchainVersion::V35);

    assert_eq!(proxy.engine().unwrap().version(), ToolchainVersion::V40);
    assert!(logs_contain("version change ignored"));
  }

  #[test]
  fn dispose_clears_engine_and_is_repeatable() {
    let mut proxy = proxy();
    proxy.perform(&[Task::constant(1)]).unwrap();
    let scratch = proxy.engine().unwrap().scratch_dir().to_path_buf();

    proxy.dispose();
    proxy.dispose();

    assert!(!proxy.has_engine());
    assert!(!scratch.exists());
  }

  #[test]
  fn open_reads_materialized_config() {
    let temp_dir = TempDir::new().unwrap();
    let settings = testutil::settings(temp_dir.path(), ToolchainVersion::V35);

    let proxy = RemoteEngineProxy::open(&settings, LogFacade::detached()).unwrap();

    assert_eq!(proxy.config.toolchain, ToolchainVersion::V35);
  }

  #[test]
  fn fault_conversion_keeps_task_index() {
    let fault: Fault = ProxyError::Task {
      index: 3,
      source: TaskError::Failed("nope".to_string()),
    }
    .into();
    assert_eq!(
      fault,
      Fault::Task {
        index: 3,
        message: "nope".to_string()
      }
    );
  }
}
