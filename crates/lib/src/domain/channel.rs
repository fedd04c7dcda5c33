//! Host end of a worker's pipes.

use std::io::{self, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::protocol::{ChannelError, Request, Response, read_frame, write_frame};

const WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct WorkerChannel {
  child: Child,
  stdin: Option<ChildStdin>,
  stdout: BufReader<ChildStdout>,
}

impl WorkerChannel {
  /// Take ownership of a spawned worker. Its stdin and stdout must be piped.
  ///
  /// A worker that is rejected here is killed and reaped.
  pub fn new(mut child: Child) -> io::Result<Self> {
    let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
      (Some(stdin), Some(stdout)) => (stdin, stdout),
      (stdin, stdout) => {
        let missing = if stdin.is_none() { "stdin" } else { "stdout" };
        drop((stdin, stdout));
        reap(&mut child);
        return Err(io::Error::other(format!("worker {} is not piped", missing)));
      }
    };
    Ok(Self {
      child,
      stdin: Some(stdin),
      stdout: BufReader::new(stdout),
    })
  }

  pub fn pid(&self) -> u32 {
    self.child.id()
  }

  /// Send one request and wait for its response.
  pub fn request(&mut self, request: &Request) -> Result<Response, ChannelError> {
    let stdin = self.stdin.as_mut().ok_or(ChannelError::Closed)?;
    write_frame(stdin, request)?;
    read_frame(&mut self.stdout)?.ok_or(ChannelError::Closed)
  }

  /// Close the worker's stdin and wait for it to exit.
  ///
  /// A worker still running after `grace` is killed.
  pub fn shutdown(mut self, grace: Duration) -> io::Result<ExitStatus> {
    drop(self.stdin.take());

    let deadline = Instant::now() + grace;
    loop {
      if let Some(status) = self.child.try_wait()? {
        debug!(pid = self.child.id(), status = %status, "worker exited");
        return Ok(status);
      }
      if Instant::now() >= deadline {
        warn!(pid = self.child.id(), "worker did not exit in time, killing it");
        return self.abort();
      }
      std::thread::sleep(WAIT_POLL);
    }
  }

  /// Kill the worker and reap it.
  pub fn abort(mut self) -> io::Result<ExitStatus> {
    drop(self.stdin.take());
    match self.child.kill() {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
      Err(e) => return Err(e),
    }
    self.child.wait()
  }
}

fn reap(child: &mut Child) {
  if let Err(e) = child.kill()
    && e.kind() != io::ErrorKind::InvalidInput
  {
    warn!(pid = child.id(), error = %e, "failed to kill worker");
  }
  if let Err(e) = child.wait() {
    warn!(pid = child.id(), error = %e, "failed to reap worker");
  }
}
