//! Standalone host process for one isolated build domain.
//!
//! Spawned by `DomainFactory`; speaks the domain protocol on stdin/stdout.

use std::io;
use std::process::ExitCode;

use isobuild_lib::domain::worker;
use isobuild_lib::logging::LogFacade;

fn main() -> ExitCode {
  let log = LogFacade::install();

  match worker::serve(io::stdin().lock(), io::stdout().lock(), log) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      tracing::error!(error = %err, "worker channel failed");
      ExitCode::FAILURE
    }
  }
}
