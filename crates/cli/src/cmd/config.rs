//! Implementation of the `isobuild config` command.

use anyhow::{Context, Result};
use serde::Serialize;

use isobuild_lib::ToolchainVersion;
use isobuild_lib::config::ConfigMaterializer;
use isobuild_lib::platform::paths;

use crate::output::{OutputFormat, print_json};

#[derive(Debug, Serialize)]
struct ConfigReport {
  toolchain: ToolchainVersion,
  path: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  content: Option<serde_json::Value>,
}

/// Materialize the config for `toolchain` and print where it landed, or
/// its content with `print`.
pub fn cmd_config(toolchain: ToolchainVersion, print: bool, output: OutputFormat) -> Result<()> {
  let materializer = ConfigMaterializer::new(paths::config_dir());
  let path = materializer
    .materialize(toolchain)
    .with_context(|| format!("Failed to materialize config for {}", toolchain))?;

  let content = if print {
    Some(std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?)
  } else {
    None
  };

  if output.is_json() {
    let content = content
      .as_deref()
      .map(serde_json::from_str::<serde_json::Value>)
      .transpose()
      .context("Materialized config is not valid JSON")?;
    return print_json(&ConfigReport {
      toolchain,
      path: path.display().to_string(),
      content,
    });
  }

  match content {
    Some(content) => print!("{}", content),
    None => println!("{}", path.display()),
  }
  Ok(())
}
