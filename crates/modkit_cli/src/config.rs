//! Headless configuration for `modkit generate`.
//!
//! A config file supplies the same inputs as the command line. It may be
//! YAML, JSON or TOML, picked by extension. Flags given on the command line
//! win over values from the file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

/// Report format for `generate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// A variable value as written in a config file.
///
/// YAML and TOML users tend to write `java_version: 21` rather than a
/// quoted string, so scalars of any type are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Text(s) => f.write_str(s),
            ConfigValue::Integer(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerateConfig {
    pub template: Option<String>,
    pub destination: Option<PathBuf>,
    pub variables: BTreeMap<String, ConfigValue>,
    pub variants: Vec<String>,
    pub overwrite: bool,
    pub git: bool,
    pub post_create: bool,
    pub output_format: Option<OutputFormat>,
}

impl GenerateConfig {
    /// Load a config file, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML config {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config {:?}", path))?,
            Some("toml") => {
                toml::from_str(&content).with_context(|| format!("Invalid TOML config {:?}", path))?
            }
            _ => bail!(
                "Unsupported config file {:?}: expected .yaml, .yml, .json or .toml",
                path
            ),
        };
        Ok(config)
    }

    pub fn variables(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
    }
}

/// Parse a `KEY=VALUE` assignment. The value may itself contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
