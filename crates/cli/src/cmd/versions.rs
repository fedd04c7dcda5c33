use anyhow::{Context, Result};
use serde::Serialize;

use isobuild_lib::ToolchainVersion;
use isobuild_lib::config::{ConfigSource, DomainConfig, EmbeddedConfigs};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Debug, Serialize)]
struct VersionInfo {
  toolchain: ToolchainVersion,
  runtime: String,
}

pub fn cmd_versions(output: OutputFormat) -> Result<()> {
  let mut versions = Vec::with_capacity(ToolchainVersion::ALL.len());
  for toolchain in ToolchainVersion::ALL {
    let text = EmbeddedConfigs
      .config_text(toolchain)
      .with_context(|| format!("No embedded config for {}", toolchain))?;
    let config: DomainConfig =
      serde_json::from_str(&text).with_context(|| format!("Embedded config for {} is invalid", toolchain))?;
    versions.push(VersionInfo {
      toolchain,
      runtime: config.runtime,
    });
  }

  if output.is_json() {
    return print_json(&versions);
  }

  println!("Supported toolchains:");
  for version in &versions {
    print_stat(version.toolchain.as_str(), &format!("runtime {}", version.runtime));
  }
  Ok(())
}
