use std::io;

use anyhow::{Context, Result};

use isobuild_lib::domain::worker;
use isobuild_lib::logging::LogFacade;

/// Serve one domain on stdin/stdout until the host disposes it or hangs up.
pub fn cmd_worker() -> Result<()> {
  let log = LogFacade::install();
  worker::serve(io::stdin().lock(), io::stdout().lock(), log).context("Domain worker failed")
}
