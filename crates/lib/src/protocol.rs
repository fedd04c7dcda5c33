//! Wire protocol between a host and a domain worker.
//!
//! Frames are single-line JSON documents. The host writes [`Request`]s to the
//! worker's stdin; the worker answers each with exactly one [`Response`] on
//! its stdout. Diagnostics never travel on stdout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{LogSink, Verbosity};
use crate::task::Task;
use crate::toolchain::ToolchainVersion;

/// Settings an isolated context is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSettings {
  /// Human-readable name of the domain, used in diagnostics.
  pub identity: String,
  pub version: ToolchainVersion,
  pub base_dir: PathBuf,
  pub config_path: PathBuf,
  /// Whether config redirects may rebind component versions.
  pub allow_redirects: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
  Init { settings: DomainSettings },
  SetVersion { version: ToolchainVersion },
  AttachLog { sink: LogSink, level: Verbosity },
  Perform { tasks: Vec<Task> },
  Dispose,
}

impl Request {
  pub fn name(&self) -> &'static str {
    match self {
      Request::Init { .. } => "init",
      Request::SetVersion { .. } => "set_version",
      Request::AttachLog { .. } => "attach_log",
      Request::Perform { .. } => "perform",
      Request::Dispose => "dispose",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
  Ready { pid: u32 },
  Ack,
  Total { value: i64 },
  Fault { fault: Fault },
}

/// A failure reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
  /// The materialized config could not be loaded.
  Config { message: String },
  /// The engine could not be constructed.
  Engine { message: String },
  /// Task `index` of the batch failed; later tasks did not run.
  Task { index: usize, message: String },
  /// The request was not valid at this point of the conversation.
  Protocol { message: String },
}

impl std::fmt::Display for Fault {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Fault::Config { message } => write!(f, "config: {}", message),
      Fault::Engine { message } => write!(f, "engine: {}", message),
      Fault::Task { index, message } => write!(f, "task {}: {}", index, message),
      Fault::Protocol { message } => write!(f, "protocol: {}", message),
    }
  }
}

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("channel io error: {0}")]
  Io(#[from] io::Error),

  #[error("failed to encode frame: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("failed to decode frame: {0}")]
  Decode(#[source] serde_json::Error),

  #[error("channel closed by peer")]
  Closed,

  #[error("unexpected {got} in reply to {request}")]
  Unexpected { request: &'static str, got: String },
}

/// Write one frame and flush it.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, frame: &T) -> Result<(), ChannelError> {
  let mut line = serde_json::to_vec(frame).map_err(ChannelError::Encode)?;
  line.push(b'\n');
  writer.write_all(&line)?;
  writer.flush()?;
  Ok(())
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream.
pub fn read_frame<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, ChannelError> {
  let mut line = String::new();
  loop {
    line.clear();
    if reader.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    if !line.trim().is_empty() {
      break;
    }
  }
  serde_json::from_str(&line).map(Some).map_err(ChannelError::Decode)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn request_wire_shape() {
    let request = Request::SetVersion {
      version: ToolchainVersion::V40,
    };
    let json = serde_json::to_string(&request).unwrap();
    assert_eq!(json, r#"{"op":"set_version","version":"v40"}"#);
    assert_eq!(serde_json::to_string(&Request::Dispose).unwrap(), r#"{"op":"dispose"}"#);
  }

  #[test]
  fn fault_response_wire_shape() {
    let response = Response::Fault {
      fault: Fault::Task {
        index: 1,
        message: "boom".to_string(),
      },
    };
    let json = serde_json::to_string(&response).unwrap();
    assert_eq!(json, r#"{"type":"fault","fault":{"kind":"task","index":1,"message":"boom"}}"#);
  }

  #[test]
  fn frames_are_newline_delimited() {
    let mut buf = Vec::new();
    write_frame(&mut buf, &Response::Ack).unwrap();
    write_frame(&mut buf, &Response::Total { value: 5 }).unwrap();
    assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 2);

    let mut reader = Cursor::new(buf);
    let first: Option<Response> = read_frame(&mut reader).unwrap();
    let second: Option<Response> = read_frame(&mut reader).unwrap();
    let end: Option<Response> = read_frame(&mut reader).unwrap();
    assert_eq!(first, Some(Response::Ack));
    assert_eq!(second, Some(Response::Total { value: 5 }));
    assert_eq!(end, None);
  }

  #[test]
  fn blank_lines_are_skipped() {
    let mut reader = Cursor::new(b"\n\n{\"type\":\"ack\"}\n".to_vec());
    let frame: Option<Response> = read_frame(&mut reader).unwrap();
    assert_eq!(frame, Some(Response::Ack));
  }

  #[test]
  fn garbage_is_a_decode_error() {
    let mut reader = Cursor::new(b"not json\n".to_vec());
    let result: Result<Option<Response>, _> = read_frame(&mut reader);
    assert!(matches!(result, Err(ChannelError::Decode(_))));
  }
}
