//! Validate command - Check templates without generating anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use modkit_templates::{lint_template, TemplateLoader};

use crate::error::CliError;

#[derive(Args)]
pub struct ValidateArgs {
    /// Specific template to validate (validates all if not specified)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Templates directory
    #[arg(long, env = "MODKIT_TEMPLATES")]
    pub templates_dir: Option<PathBuf>,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    let templates_path = super::templates_path(args.templates_dir);
    info!("Validating templates in {:?}", templates_path);

    if !templates_path.exists() {
        return Err(CliError::InvalidArgument(format!(
            "Templates directory not found: {:?}",
            templates_path
        ))
        .into());
    }

    let loader = TemplateLoader::new(&templates_path);
    let mut checked = 0;
    let mut failed = 0;

    for dir in loader.template_dirs() {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let template = match loader.load_template(&dir) {
            Ok(template) => template,
            Err(e) => {
                // Broken manifests are only reported when they could be the one asked for.
                if args.template.as_deref().map_or(true, |id| id == dir_name) {
                    checked += 1;
                    failed += 1;
                    println!("❌ {}", dir_name);
                    println!("   - {}", e);
                }
                continue;
            }
        };

        if let Some(id) = &args.template {
            if template.id() != id && dir_name != *id {
                continue;
            }
        }
        checked += 1;

        let result = lint_template(&template)?;
        if result.valid {
            println!("✅ {} ({} files)", template.id(), result.files_checked);
        } else {
            failed += 1;
            println!("❌ {}", template.id());
            for error in &result.errors {
                println!("   - {}", error);
            }
        }
        for warning in &result.warnings {
            println!("   ⚠️  {}", warning);
        }
    }

    if checked == 0 {
        return Err(match args.template {
            Some(id) => CliError::UnknownTemplate {
                id,
                available: super::available(&loader.load_all()?),
            },
            None => {
                CliError::InvalidArgument(format!("No templates found in {:?}", templates_path))
            }
        }
        .into());
    }

    println!();
    println!("Results: {} passed, {} failed", checked - failed, failed);

    if failed > 0 {
        return Err(CliError::ValidationFailed(failed).into());
    }
    Ok(())
}
