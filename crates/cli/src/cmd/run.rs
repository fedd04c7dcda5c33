//! Implementation of the `isobuild run` command.
//!
//! Creates one domain for the requested toolchain, performs the task batch
//! against it (optionally several times), and disposes it.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use isobuild_lib::logging::LogConfig;
use isobuild_lib::{DomainFactory, DomainHandle, FactoryConfig, Task, ToolchainVersion};

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success, symbols};

#[derive(Debug, Serialize)]
struct RunReport {
  toolchain: ToolchainVersion,
  identity: String,
  tasks: usize,
  totals: Vec<i64>,
}

fn load_tasks(path: &Path) -> Result<Vec<Task>> {
  let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  serde_json::from_str(&text).with_context(|| format!("Failed to parse tasks in {}", path.display()))
}

fn perform_repeated(handle: &mut DomainHandle, batch: &[Task], repeat: u32) -> Result<Vec<i64>> {
  let mut totals = Vec::with_capacity(repeat as usize);
  for run in 1..=repeat {
    let total = handle
      .perform(batch)
      .with_context(|| format!("Batch failed on run {}", run))?;
    totals.push(total);
  }
  Ok(totals)
}

/// Execute the run command.
///
/// The domain is disposed whether or not the batch succeeds; a batch failure
/// takes precedence over a teardown failure when both happen.
pub fn cmd_run(tasks: &Path, toolchain: ToolchainVersion, repeat: u32, log: LogConfig, output: OutputFormat) -> Result<()> {
  let batch = load_tasks(tasks)?;

  let mut config = FactoryConfig::from_env();
  config.worker = super::worker_command()?;
  config.log = log;
  let factory = DomainFactory::new(config);

  let start = Instant::now();
  let mut handle = factory
    .create_domain(toolchain)
    .with_context(|| format!("Failed to create domain for {}", toolchain))?;
  let identity = handle.identity().to_string();
  info!(identity = %identity, pid = handle.pid(), tasks = batch.len(), "domain ready");

  let totals = perform_repeated(&mut handle, &batch, repeat);
  let disposed = handle.dispose();
  let totals = totals?;
  disposed.context("Failed to dispose domain")?;

  if output.is_json() {
    return print_json(&RunReport {
      toolchain,
      identity,
      tasks: batch.len(),
      totals,
    });
  }

  print_info(&format!("Domain {} {} toolchain {}", identity, symbols::ARROW, toolchain));
  for (run, total) in totals.iter().enumerate() {
    print_stat(&format!("Run {}", run + 1), &total.to_string());
  }
  print_success("Batch complete");
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}
