//! Configuration module
//!
//! Settings shared by all commands.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Encoding of rendered documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// CLI configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Encoding used when printing documents
    pub output: OutputFormat,
}

impl Config {
    /// Encodes a document in the configured format
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self.output {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => {
                let mut out = serde_json::to_string_pretty(value)?;
                out.push('\n');
                out
            }
        })
    }
}
