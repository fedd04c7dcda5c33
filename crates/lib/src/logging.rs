//! Diagnostics routing between the host and its isolated contexts.
//!
//! The host never shares a global logger with its workers. Instead each
//! domain is handed a [`LogConfig`] when it is created, and the worker binds
//! its own [`LogFacade`] to that sink and level.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Registry, fmt, reload};

/// Console verbosity, from silent to chatty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
  Off,
  Error,
  Warning,
  #[default]
  Info,
  Verbose,
}

impl Verbosity {
  pub fn level_filter(self) -> LevelFilter {
    match self {
      Verbosity::Off => LevelFilter::OFF,
      Verbosity::Error => LevelFilter::ERROR,
      Verbosity::Warning => LevelFilter::WARN,
      Verbosity::Info => LevelFilter::INFO,
      Verbosity::Verbose => LevelFilter::DEBUG,
    }
  }
}

/// Where a domain writes its diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogSink {
  /// The worker's stderr, which is inherited from the host.
  #[default]
  Stderr,
  /// Appended to a file.
  File { path: PathBuf },
  /// Discarded.
  Null,
}

/// Sink and level pushed into every domain at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
  pub sink: LogSink,
  pub level: Verbosity,
}

#[derive(Debug)]
enum SinkTarget {
  Stderr,
  File(File),
  Null,
}

/// Writer handed to the fmt layer. The target behind it can be swapped at
/// any time; writes to a broken target are dropped.
#[derive(Debug, Clone)]
pub struct SinkWriter {
  target: Arc<Mutex<SinkTarget>>,
}

impl SinkWriter {
  fn new(target: SinkTarget) -> Self {
    Self {
      target: Arc::new(Mutex::new(target)),
    }
  }

  fn replace(&self, target: SinkTarget) {
    *self.target.lock().unwrap_or_else(PoisonError::into_inner) = target;
  }
}

impl Write for SinkWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = match &mut *target {
      SinkTarget::Stderr => io::stderr().write_all(buf),
      SinkTarget::File(file) => file.write_all(buf),
      SinkTarget::Null => Ok(()),
    };
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = match &mut *target {
      SinkTarget::Stderr => io::stderr().flush(),
      SinkTarget::File(file) => file.flush(),
      SinkTarget::Null => Ok(()),
    };
    Ok(())
  }
}

impl<'a> MakeWriter<'a> for SinkWriter {
  type Writer = SinkWriter;

  fn make_writer(&'a self) -> Self::Writer {
    self.clone()
  }
}

/// The logging facade of one isolated context.
pub struct LogFacade {
  writer: SinkWriter,
  level: Option<reload::Handle<LevelFilter, Registry>>,
  current: LogConfig,
}

impl std::fmt::Debug for LogFacade {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogFacade")
      .field("current", &self.current)
      .field("installed", &self.level.is_some())
      .finish()
  }
}

impl LogFacade {
  /// Install the facade as this process's global subscriber.
  ///
  /// Starts on stderr at warning level until a sink is attached. If another
  /// subscriber is already installed the facade still tracks its sink but
  /// cannot change the level.
  pub fn install() -> Self {
    let initial = LogConfig {
      sink: LogSink::Stderr,
      level: Verbosity::Warning,
    };
    let writer = SinkWriter::new(SinkTarget::Stderr);
    let (filter, handle) = reload::Layer::new(initial.level.level_filter());

    let installed = tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_writer(writer.clone()).with_ansi(false))
      .try_init()
      .is_ok();

    Self {
      writer,
      level: installed.then_some(handle),
      current: initial,
    }
  }

  /// A facade that is not wired to any subscriber.
  pub fn detached() -> Self {
    Self {
      writer: SinkWriter::new(SinkTarget::Null),
      level: None,
      current: LogConfig {
        sink: LogSink::Null,
        level: Verbosity::Off,
      },
    }
  }

  pub fn current(&self) -> &LogConfig {
    &self.current
  }

  /// Writer the facade currently feeds.
  pub fn writer(&self) -> SinkWriter {
    self.writer.clone()
  }

  /// Rebind to `sink` at `level`.
  ///
  /// Best-effort: if the sink cannot be opened the previous one stays in
  /// place. The level is applied either way.
  pub fn attach(&mut self, sink: &LogSink, level: Verbosity) {
    if let Some(handle) = &self.level
      && let Err(err) = handle.reload(level.level_filter())
    {
      warn!(error = %err, "failed to change log level");
    }
    self.current.level = level;

    if *sink == self.current.sink {
      return;
    }

    let target = match sink {
      LogSink::Stderr => SinkTarget::Stderr,
      LogSink::Null => SinkTarget::Null,
      LogSink::File { path } => match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => SinkTarget::File(file),
        Err(err) => {
          warn!(error = %err, path = %path.display(), "cannot open log sink, keeping previous sink");
          return;
        }
      },
    };
    self.writer.replace(target);
    self.current.sink = sink.clone();
    debug!(sink = ?sink, level = ?level, "log sink attached");
  }
}
