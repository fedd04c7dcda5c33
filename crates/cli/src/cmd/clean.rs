use anyhow::{Context, Result};
use serde::Serialize;

use isobuild_lib::config::ConfigMaterializer;
use isobuild_lib::platform::paths;

use crate::output::{OutputFormat, print_info, print_json, print_success};

#[derive(Debug, Serialize)]
struct CleanReport {
  dir: String,
  removed: usize,
}

pub fn cmd_clean(output: OutputFormat) -> Result<()> {
  let materializer = ConfigMaterializer::new(paths::config_dir());
  let removed = materializer
    .purge()
    .context("Failed to remove materialized configs")?;

  if output.is_json() {
    return print_json(&CleanReport {
      dir: materializer.dir().display().to_string(),
      removed,
    });
  }

  if removed == 0 {
    print_info("Nothing to clean");
  } else {
    print_success(&format!(
      "Removed {} config file(s) from {}",
      removed,
      materializer.dir().display()
    ));
  }
  Ok(())
}
