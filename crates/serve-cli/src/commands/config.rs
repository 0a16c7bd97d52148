//! Configuration commands

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::Result;
use serve_core::ServeConfig;

/// Print the effective configuration
pub fn show_config(config: &ServeConfig, output_format: OutputFormat) -> Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        _ => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}

/// Report whether the configuration passed validation
pub fn validate_config(config: &ServeConfig, output_format: OutputFormat) -> Result<()> {
    config.validate()?;
    OutputFormatter::new(output_format).print_success("Configuration is valid")
}
