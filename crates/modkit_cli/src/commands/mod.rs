//! CLI command definitions.
//!
//! This module defines the command structure for the modkit CLI.
//! Each subcommand drives the `modkit_templates` library.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use modkit_templates::{Template, TemplateLoader, TemplateRegistry};

use crate::error::CliError;

pub mod generate;
pub mod inspect;
pub mod list;
pub mod validate;

const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// modkit - project scaffolding from placeholder templates
#[derive(Parser)]
#[command(name = "modkit")]
#[command(version, about = "modkit - project scaffolding from placeholder templates")]
#[command(long_about = r#"
modkit instantiates a template directory into a new project. File names and
contents may carry {{variable}} placeholders; loader variants (for example
fabric, forge and neoforge) select optional subtrees.

COMMANDS:
  generate  → Create a project from a template
  validate  → Check templates for manifest and placeholder problems
  list      → List available templates
  inspect   → Show a template's variables and variants

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or unknown template
  3 - Validation failure
  4 - I/O failure (partial output rolled back)
  5 - Destination not empty or in use
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new project from a template
    Generate(generate::GenerateArgs),

    /// Validate templates
    Validate(validate::ValidateArgs),

    /// List available templates
    List(list::ListArgs),

    /// Show details of a template
    Inspect(inspect::InspectArgs),
}

/// Resolve the templates directory. `MODKIT_TEMPLATES` is applied by clap.
pub fn templates_path(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR))
}

pub fn load_registry(templates_path: &Path) -> Result<TemplateRegistry> {
    TemplateLoader::new(templates_path)
        .load_all()
        .with_context(|| format!("Failed to load templates from {:?}", templates_path))
}

/// Load the template named `id`, or the only template when `id` is `None`.
///
/// `load_all` skips templates that fail to load. When the requested
/// template is one of them, its load error is returned rather than an
/// unknown-template error.
pub fn resolve_template(templates_path: &Path, id: Option<&str>) -> Result<Template> {
    let loader = TemplateLoader::new(templates_path);
    let registry = load_registry(templates_path)?;

    let Some(id) = id else {
        return match (registry.list().as_slice(), loader.template_dirs().as_slice()) {
            ([only], _) => Ok((*only).clone()),
            ([], [dir]) => load_dir(&loader, dir),
            _ => Err(CliError::InvalidArgument(format!(
                "--template is required (available: {})",
                available(&registry)
            ))
            .into()),
        };
    };

    if let Some(template) = registry.get(id) {
        return Ok(template.clone());
    }

    let dir = templates_path.join(id);
    if dir.is_dir() {
        let template = load_dir(&loader, &dir)?;
        if template.id() == id {
            return Ok(template);
        }
    }

    Err(CliError::UnknownTemplate {
        id: id.to_string(),
        available: available(&registry),
    }
    .into())
}

fn load_dir(loader: &TemplateLoader, dir: &Path) -> Result<Template> {
    loader
        .load_template(dir)
        .with_context(|| format!("Failed to load template from {:?}", dir))
}

pub fn available(registry: &TemplateRegistry) -> String {
    if registry.is_empty() {
        return "none".to_string();
    }
    registry
        .list()
        .iter()
        .map(|t| t.id())
        .collect::<Vec<_>>()
        .join(", ")
}
