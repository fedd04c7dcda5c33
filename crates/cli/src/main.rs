mod cmd;
mod output;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use isobuild_lib::ToolchainVersion;
use isobuild_lib::logging::{LogConfig, LogSink, Verbosity};

use crate::output::{OutputFormat, print_error};

/// isobuild - run build work inside isolated toolchain domains
#[derive(Parser)]
#[command(name = "isobuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase diagnostic output (repeatable)
  #[arg(short, long, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
  verbose: u8,

  /// Only report errors
  #[arg(short, long, global = true)]
  quiet: bool,

  /// Write diagnostics (host and domains) to this file instead of stderr
  #[arg(long, global = true, value_name = "PATH")]
  log_file: Option<PathBuf>,

  /// Print machine-readable JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a batch of tasks inside a fresh domain
  Run {
    /// JSON file holding an array of tasks
    tasks: PathBuf,

    /// Toolchain version the domain is bound to
    #[arg(short, long, default_value_t = ToolchainVersion::default())]
    toolchain: ToolchainVersion,

    /// Perform the batch this many times on the same domain
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,
  },

  /// List supported toolchain versions
  Versions,

  /// Materialize the config for a toolchain version
  Config {
    toolchain: ToolchainVersion,

    /// Print the config content instead of its path
    #[arg(long)]
    print: bool,
  },

  /// Remove materialized config files
  Clean,

  /// Serve the domain protocol on stdin/stdout
  #[command(hide = true)]
  Worker,
}

impl Cli {
  fn verbosity(&self) -> Verbosity {
    if self.quiet {
      return Verbosity::Error;
    }
    match self.verbose {
      0 => Verbosity::Warning,
      1 => Verbosity::Info,
      _ => Verbosity::Verbose,
    }
  }

  /// Log settings handed to every domain this invocation creates.
  fn domain_log(&self) -> LogConfig {
    LogConfig {
      sink: match &self.log_file {
        Some(path) => LogSink::File { path: path.clone() },
        None => LogSink::Stderr,
      },
      level: self.verbosity(),
    }
  }
}

fn init_logging(level: Verbosity, log_file: Option<&Path>) -> Result<()> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.level_filter().into()));

  match log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
    }
  }
  Ok(())
}

fn run(cli: Cli) -> Result<()> {
  let log = cli.domain_log();
  let output = OutputFormat::from_json_flag(cli.json);

  // The worker installs its own subscriber.
  if !matches!(cli.command, Commands::Worker) {
    init_logging(log.level, cli.log_file.as_deref())?;
  }

  match cli.command {
    Commands::Run {
      tasks,
      toolchain,
      repeat,
    } => cmd::cmd_run(&tasks, toolchain, repeat, log, output),
    Commands::Versions => cmd::cmd_versions(output),
    Commands::Config { toolchain, print } => cmd::cmd_config(toolchain, print, output),
    Commands::Clean => cmd::cmd_clean(output),
    Commands::Worker => cmd::cmd_worker(),
  }
}

fn main() {
  let cli = Cli::parse();
  if let Err(err) = run(cli) {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}
