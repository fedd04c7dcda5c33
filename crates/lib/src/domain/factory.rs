//! Construction of isolated domains.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{ConfigError, ConfigMaterializer};
use crate::consts::{APP_NAME, ENV_WORKER, WORKER_BIN};
use crate::logging::LogConfig;
use crate::platform::paths;
use crate::protocol::{ChannelError, DomainSettings, Request, Response};
use crate::toolchain::ToolchainVersion;

use super::channel::WorkerChannel;
use super::handle::DomainHandle;
use super::{CreationError, DomainError};

/// Program (and leading arguments) that hosts an isolated context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
  pub program: PathBuf,
  pub args: Vec<String>,
}

impl WorkerCommand {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: &str) -> Self {
    self.args.push(arg.to_string());
    self
  }

  /// Resolve the worker program.
  ///
  /// `ISOBUILD_WORKER` wins; otherwise the `isobuild-worker` binary next to
  /// the current executable.
  pub fn from_env() -> Self {
    if let Some(program) = std::env::var_os(ENV_WORKER).filter(|v| !v.is_empty()) {
      return Self::new(program);
    }
    let name = format!("{}{}", WORKER_BIN, std::env::consts::EXE_SUFFIX);
    let program = std::env::current_exe()
      .ok()
      .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
      .unwrap_or_else(|| PathBuf::from(name));
    Self::new(program)
  }
}

/// Host-side configuration shared by every domain a factory creates.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
  pub worker: WorkerCommand,
  /// Directory domain configs are materialized into.
  pub config_dir: PathBuf,
  /// Working directory of every worker.
  pub base_dir: PathBuf,
  /// Sink and level each domain's diagnostics are bound to.
  pub log: LogConfig,
  /// How long a disposed worker gets to exit before it is killed.
  pub shutdown_grace: Duration,
}

impl FactoryConfig {
  pub fn from_env() -> Self {
    Self {
      worker: WorkerCommand::from_env(),
      config_dir: paths::config_dir(),
      base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
      log: LogConfig::default(),
      shutdown_grace: Duration::from_secs(5),
    }
  }
}

impl Default for FactoryConfig {
  fn default() -> Self {
    Self::from_env()
  }
}

/// Creates isolated domains, one worker process each.
#[derive(Debug, Clone)]
pub struct DomainFactory {
  config: FactoryConfig,
  materializer: ConfigMaterializer,
}

impl DomainFactory {
  pub fn new(config: FactoryConfig) -> Self {
    let materializer = ConfigMaterializer::new(&config.config_dir);
    Self { config, materializer }
  }

  /// Use a custom materializer instead of one over the embedded payloads.
  pub fn with_materializer(config: FactoryConfig, materializer: ConfigMaterializer) -> Self {
    Self { config, materializer }
  }

  pub fn materializer(&self) -> &ConfigMaterializer {
    &self.materializer
  }

  /// Bring up a domain bound to `version`.
  ///
  /// A worker that fails any step of the handshake is killed and reaped
  /// before the error is returned.
  pub fn create_domain(&self, version: ToolchainVersion) -> Result<DomainHandle, DomainError> {
    let identity = format!("{}.{}", APP_NAME, version);
    let creation = |source: CreationError| DomainError::Creation {
      identity: identity.clone(),
      source,
    };

    let config_path = self.materializer.materialize(version).map_err(|err| match err {
      ConfigError::NotFound { version } => DomainError::ConfigNotFound { version },
      other => creation(other.into()),
    })?;

    let settings = DomainSettings {
      identity: identity.clone(),
      version,
      base_dir: self.config.base_dir.clone(),
      config_path,
      // Tolerate minor version skew of components inside the domain.
      allow_redirects: true,
    };

    debug!(identity = %identity, version = %version, "constructing build domain");

    let program = &self.config.worker.program;
    let spawn_failed = |source: std::io::Error| {
      creation(CreationError::Spawn {
        program: program.clone(),
        source,
      })
    };
    let child = Command::new(program)
      .args(&self.config.worker.args)
      .current_dir(&settings.base_dir)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(spawn_failed)?;
    let mut channel = WorkerChannel::new(child).map_err(spawn_failed)?;

    let handshake = [
      Request::Init { settings },
      Request::SetVersion { version },
      Request::AttachLog {
        sink: self.config.log.sink.clone(),
        level: self.config.log.level,
      },
    ];
    for request in &handshake {
      let name = request.name();
      let outcome = match channel.request(request) {
        Ok(Response::Ready { .. } | Response::Ack) => Ok(()),
        Ok(Response::Fault { fault }) => Err(CreationError::Rejected { request: name, fault }),
        Ok(other) => Err(CreationError::Handshake {
          request: name,
          source: ChannelError::Unexpected {
            request: name,
            got: format!("{:?}", other),
          },
        }),
        Err(source) => Err(CreationError::Handshake { request: name, source }),
      };
      if let Err(source) = outcome {
        if let Err(e) = channel.abort() {
          warn!(identity = %identity, error = %e, "failed to reap worker after aborted creation");
        }
        return Err(creation(source));
      }
    }

    let handle = DomainHandle::new(identity, version, channel, self.config.shutdown_grace);
    debug!(identity = %handle.identity(), pid = handle.pid(), "build domain ready");
    Ok(handle)
  }
}
