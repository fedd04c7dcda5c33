//! Writing embedded configs to a location a worker can read.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use super::{ConfigError, ConfigSource, EmbeddedConfigs};
use crate::consts::APP_NAME;
use crate::toolchain::ToolchainVersion;

/// Writes per-toolchain config payloads to a version-keyed path.
///
/// The target path depends only on the toolchain, so concurrent domain
/// creations for the same version race on the same file. Each call writes to
/// a private temp file in the same directory and renames it into place, so a
/// reader always sees one complete payload.
///
/// Files are left behind after the domain goes away; [`purge`](Self::purge)
/// removes them on request.
#[derive(Clone)]
pub struct ConfigMaterializer {
  source: Arc<dyn ConfigSource>,
  dir: PathBuf,
}

impl std::fmt::Debug for ConfigMaterializer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConfigMaterializer").field("dir", &self.dir).finish_non_exhaustive()
  }
}

impl ConfigMaterializer {
  /// Materializer for the embedded payloads, writing into `dir`.
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self::with_source(dir, Arc::new(EmbeddedConfigs))
  }

  pub fn with_source(dir: impl Into<PathBuf>, source: Arc<dyn ConfigSource>) -> Self {
    Self {
      source,
      dir: dir.into(),
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Path the config for `version` is materialized at.
  pub fn config_path(&self, version: ToolchainVersion) -> PathBuf {
    self.dir.join(format!("{}.{}.json", APP_NAME, version))
  }

  /// Write the payload for `version` and return its path.
  pub fn materialize(&self, version: ToolchainVersion) -> Result<PathBuf, ConfigError> {
    let text = self
      .source
      .config_text(version)
      .ok_or(ConfigError::NotFound { version })?;

    let path = self.config_path(version);
    let write_err = |source| ConfigError::Write {
      path: path.clone(),
      source,
    };

    std::fs::create_dir_all(&self.dir).map_err(write_err)?;

    let mut staged = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
    staged.write_all(text.as_bytes()).map_err(write_err)?;
    staged.flush().map_err(write_err)?;
    staged.persist(&path).map_err(|e| write_err(e.error))?;

    debug!(version = %version, path = %path.display(), "materialized domain config");
    Ok(path)
  }

  /// Remove every materialized config in this materializer's directory.
  ///
  /// Returns the number of files removed.
  pub fn purge(&self) -> Result<usize, ConfigError> {
    let mut removed = 0;
    for version in ToolchainVersion::ALL {
      let path = self.config_path(version);
      match std::fs::remove_file(&path) {
        Ok(()) => {
          trace!(path = %path.display(), "removed materialized config");
          removed += 1;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(ConfigError::Write { path, source }),
      }
    }
    Ok(removed)
  }
}
