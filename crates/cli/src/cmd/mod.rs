mod clean;
mod config;
mod run;
mod versions;
mod worker;

use anyhow::{Context, Result};

use isobuild_lib::WorkerCommand;
use isobuild_lib::consts::ENV_WORKER;

pub use clean::cmd_clean;
pub use config::cmd_config;
pub use run::cmd_run;
pub use versions::cmd_versions;
pub use worker::cmd_worker;

/// Worker program for domains created by this binary.
///
/// `ISOBUILD_WORKER` wins; otherwise this executable's hidden `worker`
/// subcommand serves the domain.
fn worker_command() -> Result<WorkerCommand> {
  if std::env::var_os(ENV_WORKER).is_some_and(|v| !v.is_empty()) {
    return Ok(WorkerCommand::from_env());
  }
  let exe = std::env::current_exe().context("Failed to locate the isobuild executable")?;
  Ok(WorkerCommand::new(exe).arg("worker"))
}
