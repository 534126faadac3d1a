//! `devbundle entries` command implementation.
//!
//! Prints the bundler entry map for the entries named in the worker
//! environment. The bundler config reads this to build exactly what the
//! broker asked for.

use devbundle_core::BuildConfig;
use miette::{IntoDiagnostic, Result};

pub fn run(config: &BuildConfig, only: Option<&str>) -> Result<()> {
    let selected = match only {
        Some(list) => config.entry_points(Some(list)),
        None => config.entry_points_from_env(),
    }
    .into_diagnostic()?;
    let map = selected.to_bundler_entries();
    println!("{}", serde_json::to_string_pretty(&map).into_diagnostic()?);
    Ok(())
}
