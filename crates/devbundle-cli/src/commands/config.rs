//! `devbundle config` command implementation.

use devbundle_core::BuildConfig;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
struct OptionResult<'a> {
    name: &'a str,
    value: devbundle_core::OptionValue,
}

/// Print one named option.
pub fn run(config: &BuildConfig, name: &str, json: bool) -> Result<()> {
    let value = config.option(name).into_diagnostic()?;
    if json {
        let result = OptionResult { name, value };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        println!("{value}");
    }
    Ok(())
}

/// Print the whole resolved config.
pub fn dump(config: &BuildConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config).into_diagnostic()?);
    Ok(())
}
