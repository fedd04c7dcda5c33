//! Per-toolchain domain configuration.
//!
//! Every supported toolchain ships a JSON payload compiled into the library.
//! Before a domain's worker starts, the payload is written to disk by the
//! [`ConfigMaterializer`] and the worker loads it back as a [`DomainConfig`].

mod materialize;

pub use materialize::ConfigMaterializer;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::toolchain::ToolchainVersion;

/// Errors raised while resolving, writing, or loading a domain config.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// No payload is packaged for the toolchain. This is a packaging defect.
  #[error("no embedded configuration for toolchain {version}")]
  NotFound { version: ToolchainVersion },

  #[error("failed to write config {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Settings an isolated context reads when it initializes its engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
  /// Toolchain the payload was written for.
  pub toolchain: ToolchainVersion,

  /// Runtime version string exported to command tasks.
  pub runtime: String,

  /// Shell used for command tasks. `None` selects the platform default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,

  /// Environment exported to every command task.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Component version redirects, honored only under a permissive binding policy.
  #[serde(default)]
  pub redirects: BTreeMap<String, String>,
}

impl DomainConfig {
  /// Load a materialized config from disk.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Resolves the raw config payload for a toolchain.
pub trait ConfigSource: Send + Sync {
  fn config_text(&self, version: ToolchainVersion) -> Option<Cow<'_, str>>;
}

/// Payloads compiled into the library, one per supported toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedConfigs;

impl ConfigSource for EmbeddedConfigs {
  fn config_text(&self, version: ToolchainVersion) -> Option<Cow<'_, str>> {
    let text = match version {
      ToolchainVersion::V20 => include_str!("../../configs/v20.json"),
      ToolchainVersion::V30 => include_str!("../../configs/v30.json"),
      ToolchainVersion::V35 => include_str!("../../configs/v35.json"),
      ToolchainVersion::V40 => include_str!("../../configs/v40.json"),
    };
    Some(Cow::Borrowed(text))
  }
}

impl ConfigSource for BTreeMap<ToolchainVersion, String> {
  fn config_text(&self, version: ToolchainVersion) -> Option<Cow<'_, str>> {
    self.get(&version).map(|text| Cow::Borrowed(text.as_str()))
  }
}
