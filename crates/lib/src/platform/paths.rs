use std::path::PathBuf;

use crate::consts::ENV_CONFIG_DIR;

/// Returns the directory domain configs are materialized into.
///
/// `ISOBUILD_CONFIG_DIR` takes precedence; otherwise the OS temp directory.
pub fn config_dir() -> PathBuf {
  std::env::var_os(ENV_CONFIG_DIR)
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(std::env::temp_dir)
}
