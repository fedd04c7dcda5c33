//! Names shared between the host and its workers.

pub const APP_NAME: &str = "isobuild";

/// File name of the standalone worker binary.
pub const WORKER_BIN: &str = "isobuild-worker";

/// Overrides the worker program spawned for each domain.
pub const ENV_WORKER: &str = "ISOBUILD_WORKER";

/// Overrides the directory materialized domain configs are written to.
pub const ENV_CONFIG_DIR: &str = "ISOBUILD_CONFIG_DIR";
