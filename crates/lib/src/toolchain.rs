use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Toolchain generations a build domain can target.
///
/// A domain is bound to exactly one of these for its entire lifetime; the
/// version selects both the embedded configuration and the engine variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainVersion {
  #[default]
  V20,
  V30,
  V35,
  V40,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown toolchain version: {0} (supported: v20, v30, v35, v40)")]
pub struct UnknownToolchain(pub String);

impl ToolchainVersion {
  /// Every supported toolchain, oldest first.
  pub const ALL: [ToolchainVersion; 4] = [Self::V20, Self::V30, Self::V35, Self::V40];

  /// Returns the lowercase tag for this toolchain (e.g. "v40")
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::V20 => "v20",
      Self::V30 => "v30",
      Self::V35 => "v35",
      Self::V40 => "v40",
    }
  }
}

impl fmt::Display for ToolchainVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for ToolchainVersion {
  type Err = UnknownToolchain;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let tag = s.trim().to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|v| v.as_str() == tag)
      .ok_or_else(|| UnknownToolchain(s.to_string()))
  }
}
