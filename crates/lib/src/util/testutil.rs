//! Test utilities for isobuild-lib.
//!
//! Builders for configs and settings shared by the engine, task, proxy, and
//! worker tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::DomainConfig;
use crate::protocol::DomainSettings;
use crate::toolchain::ToolchainVersion;

/// A config with a usable PATH and one redirect for `build-framework`.
pub fn domain_config(toolchain: ToolchainVersion) -> DomainConfig {
  let mut env = BTreeMap::new();
  env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
  let mut redirects = BTreeMap::new();
  redirects.insert("build-framework".to_string(), "4.0.0".to_string());
  DomainConfig {
    toolchain,
    runtime: "4.0.30319".to_string(),
    shell: None,
    env,
    redirects,
  }
}

/// Write [`domain_config`] into `dir` the way the materializer names it.
pub fn write_config(dir: &Path, toolchain: ToolchainVersion) -> PathBuf {
  let path = dir.join(format!("isobuild.{}.json", toolchain));
  let content = serde_json::to_string_pretty(&domain_config(toolchain)).unwrap();
  std::fs::write(&path, content).unwrap();
  path
}

/// Settings for a domain rooted at `dir`, with its config already written.
pub fn settings(dir: &Path, toolchain: ToolchainVersion) -> DomainSettings {
  DomainSettings {
    identity: format!("isobuild.{}", toolchain),
    version: toolchain,
    base_dir: dir.to_path_buf(),
    config_path: write_config(dir, toolchain),
    allow_redirects: true,
  }
}
