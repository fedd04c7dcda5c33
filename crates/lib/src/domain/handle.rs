//! Host-side handle to one isolated domain.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::protocol::{ChannelError, Fault, Request, Response};
use crate::task::Task;
use crate::toolchain::ToolchainVersion;

use super::DomainError;
use super::channel::WorkerChannel;

enum HandleState {
  Ready(WorkerChannel),
  Disposed,
}

/// Owner of one isolated context and the engine proxy inside it.
///
/// A handle is `Ready` from creation until [`dispose`](Self::dispose) moves it
/// to `Disposed`, after which every [`perform`](Self::perform) fails with
/// [`DomainError::UseAfterDispose`]. Dropping a ready handle disposes it.
pub struct DomainHandle {
  identity: String,
  version: ToolchainVersion,
  pid: u32,
  shutdown_grace: Duration,
  state: HandleState,
}

impl std::fmt::Debug for DomainHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DomainHandle")
      .field("identity", &self.identity)
      .field("version", &self.version)
      .field("pid", &self.pid)
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

impl DomainHandle {
  pub(crate) fn new(
    identity: String,
    version: ToolchainVersion,
    channel: WorkerChannel,
    shutdown_grace: Duration,
  ) -> Self {
    Self {
      identity,
      version,
      pid: channel.pid(),
      shutdown_grace,
      state: HandleState::Ready(channel),
    }
  }

  /// Toolchain this domain was created for.
  pub fn tools_version(&self) -> ToolchainVersion {
    self.version
  }

  pub fn identity(&self) -> &str {
    &self.identity
  }

  /// Process id of the worker hosting this domain.
  pub fn pid(&self) -> u32 {
    self.pid
  }

  pub fn is_disposed(&self) -> bool {
    matches!(self.state, HandleState::Disposed)
  }

  /// Run `tasks` in order inside the domain and return the sum of their results.
  ///
  /// Blocks until the whole batch has run or a task fails. A failed task
  /// aborts the rest of the batch but leaves the domain usable.
  pub fn perform(&mut self, tasks: &[Task]) -> Result<i64, DomainError> {
    let HandleState::Ready(channel) = &mut self.state else {
      return Err(DomainError::UseAfterDispose {
        identity: self.identity.clone(),
      });
    };

    let request = Request::Perform { tasks: tasks.to_vec() };
    let response = channel.request(&request).map_err(|source| match source {
      // Frames are encoded in full before anything is written.
      ChannelError::Encode(_) => DomainError::InvalidRequest {
        identity: self.identity.clone(),
        source,
      },
      source => DomainError::WorkerLost {
        identity: self.identity.clone(),
        source,
      },
    })?;

    match response {
      Response::Total { value } => {
        debug!(identity = %self.identity, tasks = tasks.len(), total = value, "batch performed");
        Ok(value)
      }
      Response::Fault {
        fault: Fault::Task { index, message },
      } => Err(DomainError::TaskExecution {
        identity: self.identity.clone(),
        index,
        message,
      }),
      Response::Fault { fault } => Err(DomainError::Engine {
        identity: self.identity.clone(),
        message: fault.to_string(),
      }),
      other => Err(DomainError::WorkerLost {
        identity: self.identity.clone(),
        source: ChannelError::Unexpected {
          request: request.name(),
          got: format!("{:?}", other),
        },
      }),
    }
  }

  /// Dispose the engine inside the domain, then tear the worker down.
  ///
  /// Calling this on a disposed handle does nothing.
  pub fn dispose(&mut self) -> Result<(), DomainError> {
    let HandleState::Ready(mut channel) = std::mem::replace(&mut self.state, HandleState::Disposed) else {
      return Ok(());
    };

    // The engine has to be released while its context is still alive.
    match channel.request(&Request::Dispose) {
      Ok(Response::Ack) => {}
      Ok(other) => warn!(identity = %self.identity, response = ?other, "unexpected reply to dispose"),
      Err(err) => warn!(identity = %self.identity, error = %err, "domain did not acknowledge dispose"),
    }

    let status = channel
      .shutdown(self.shutdown_grace)
      .map_err(|source| DomainError::Teardown {
        identity: self.identity.clone(),
        source,
      })?;
    info!(identity = %self.identity, pid = self.pid, status = %status, "domain torn down");
    Ok(())
  }
}

impl Drop for DomainHandle {
  fn drop(&mut self) {
    if self.is_disposed() {
      return;
    }
    warn!(identity = %self.identity, "domain handle dropped without dispose");
    if let Err(err) = self.dispose() {
      warn!(error = %err, "failed to dispose dropped domain");
    }
  }
}
