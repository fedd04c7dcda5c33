//! Main loop of an isolated context.
//!
//! A worker process reads requests from its stdin and answers on its stdout.
//! The conversation always opens with `init`; everything after that is
//! forwarded to the [`RemoteEngineProxy`] the worker builds from the init
//! settings.

use std::io::{BufRead, Write};

use tracing::{debug, error, info, info_span};

use crate::logging::LogFacade;
use crate::protocol::{ChannelError, Fault, Request, Response, read_frame, write_frame};

use super::proxy::RemoteEngineProxy;

/// Serve one domain until the host closes the channel.
pub fn serve<R: BufRead, W: Write>(mut input: R, mut output: W, log: LogFacade) -> Result<(), ChannelError> {
  let settings = match read_frame::<_, Request>(&mut input)? {
    Some(Request::Init { settings }) => settings,
    Some(other) => {
      let fault = Fault::Protocol {
        message: format!("expected init, got {}", other.name()),
      };
      write_frame(&mut output, &Response::Fault { fault })?;
      return Err(ChannelError::Unexpected {
        request: "handshake",
        got: other.name().to_string(),
      });
    }
    None => return Ok(()),
  };

  let _span = info_span!("domain", identity = %settings.identity).entered();

  let mut proxy = match RemoteEngineProxy::open(&settings, log) {
    Ok(proxy) => proxy,
    Err(err) => {
      error!(error = %err, "failed to initialize domain");
      let fault = Fault::Config { message: err.to_string() };
      write_frame(&mut output, &Response::Fault { fault })?;
      return Ok(());
    }
  };

  write_frame(
    &mut output,
    &Response::Ready {
      pid: std::process::id(),
    },
  )?;
  info!(version = %settings.version, "domain ready");

  while let Some(request) = read_frame::<_, Request>(&mut input)? {
    debug!(request = request.name(), "request received");
    let response = match request {
      Request::SetVersion { version } => {
        proxy.set_version(version);
        Response::Ack
      }
      Request::AttachLog { sink, level } => {
        proxy.attach_log(&sink, level);
        Response::Ack
      }
      Request::Perform { tasks } => match proxy.perform(&tasks) {
        Ok(value) => Response::Total { value },
        Err(err) => {
          error!(error = %err, "batch failed");
          Response::Fault { fault: err.into() }
        }
      },
      Request::Dispose => {
        proxy.dispose();
        Response::Ack
      }
      Request::Init { .. } => Response::Fault {
        fault: Fault::Protocol {
          message: "domain is already initialized".to_string(),
        },
      },
    };
    write_frame(&mut output, &response)?;
  }

  proxy.dispose();
  info!("channel closed, domain exiting");
  Ok(())
}
