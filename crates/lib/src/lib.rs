//! isobuild-lib: isolated build domains.
//!
//! This crate runs build work against a specific toolchain version inside a
//! dedicated worker process, so that one toolchain's state never leaks into
//! another and a crash in one domain cannot take down its siblings or the host:
//! - `toolchain`: the supported toolchain versions
//! - `config`: embedded per-toolchain configs and their materialization
//! - `engine`: the build engine living inside a domain
//! - `task`: units of work performed against an engine
//! - `domain`: the factory, host handle, and in-worker proxy
//! - `protocol` / `logging`: what crosses the process boundary

pub mod config;
pub mod consts;
pub mod domain;
pub mod engine;
pub mod logging;
pub mod platform;
pub mod protocol;
pub mod task;
pub mod toolchain;
pub mod util;

pub use domain::{CreationError, DomainError, DomainFactory, DomainHandle, FactoryConfig, WorkerCommand};
pub use task::{BuildTask, Task};
pub use toolchain::ToolchainVersion;
