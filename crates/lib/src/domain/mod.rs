//! Isolated build domains.
//!
//! A domain is one worker process bound to one toolchain version. The host
//! creates it through a [`DomainFactory`], drives it through the returned
//! [`DomainHandle`], and disposes it when done:
//!
//! ```text
//! DomainFactory::create_domain(v40)
//!     │
//!     ├── ConfigMaterializer → <config dir>/isobuild.v40.json
//!     ├── spawn worker ─────── init → ready
//!     ├── set_version ─────── ack
//!     ├── attach_log ──────── ack
//!     │
//!     └── DomainHandle
//!             ├── perform(tasks) → total      (engine built on first call)
//!             └── dispose()      → engine released, worker reaped
//! ```
//!
//! Inside the worker, [`worker::serve`] feeds requests to a
//! [`RemoteEngineProxy`], which owns the single [`BuildEngine`] of that
//! context.
//!
//! [`BuildEngine`]: crate::engine::BuildEngine

mod channel;
mod factory;
mod handle;
mod proxy;
pub mod worker;

pub use factory::{DomainFactory, FactoryConfig, WorkerCommand};
pub use handle::DomainHandle;
pub use proxy::{ProxyError, RemoteEngineProxy};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::{ChannelError, Fault};
use crate::toolchain::ToolchainVersion;

/// Errors surfaced to callers of the domain API.
#[derive(Debug, Error)]
pub enum DomainError {
  /// The toolchain has no packaged configuration. Not worth retrying.
  #[error("no embedded configuration for toolchain {version}")]
  ConfigNotFound { version: ToolchainVersion },

  /// The isolated context could not be brought up.
  #[error("failed to create domain {identity}: {source}")]
  Creation {
    identity: String,
    #[source]
    source: CreationError,
  },

  /// A task failed; the tasks after it in the batch did not run.
  #[error("task {index} failed in domain {identity}: {message}")]
  TaskExecution {
    identity: String,
    index: usize,
    message: String,
  },

  /// The engine could not be constructed inside the domain.
  #[error("engine failure in domain {identity}: {message}")]
  Engine { identity: String, message: String },

  /// The request could not be encoded on the host. Nothing reached the
  /// worker and the domain is still usable.
  #[error("invalid request for domain {identity}: {source}")]
  InvalidRequest {
    identity: String,
    #[source]
    source: ChannelError,
  },

  #[error("domain {identity} was used after dispose")]
  UseAfterDispose { identity: String },

  /// The worker stopped answering, most likely because it crashed.
  #[error("lost domain {identity}: {source}")]
  WorkerLost {
    identity: String,
    #[source]
    source: ChannelError,
  },

  #[error("failed to tear down domain {identity}: {source}")]
  Teardown {
    identity: String,
    #[source]
    source: io::Error,
  },
}

/// Why a domain could not be created.
#[derive(Debug, Error)]
pub enum CreationError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("failed to spawn worker {program}: {source}")]
  Spawn {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{request} failed: {source}")]
  Handshake {
    request: &'static str,
    #[source]
    source: ChannelError,
  },

  #[error("{request} rejected: {fault}")]
  Rejected { request: &'static str, fault: Fault },
}
