//! Inspect command - Show a template's inputs.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use modkit_templates::VariableKind;

use crate::config::OutputFormat;

#[derive(Args)]
pub struct InspectArgs {
    /// Template id
    pub id: String,

    /// Templates directory
    #[arg(long, env = "MODKIT_TEMPLATES")]
    pub templates_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

pub async fn execute(args: InspectArgs) -> Result<()> {
    let templates_path = super::templates_path(args.templates_dir);
    let template = super::resolve_template(&templates_path, Some(&args.id))?;
    let manifest = &template.manifest;

    if args.output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(manifest)?);
        return Ok(());
    }

    println!("📋 {} (v{})", manifest.name, manifest.version);
    println!("   id: {}", manifest.id);
    if let Some(author) = &manifest.author {
        println!("   author: {}", author);
    }
    println!("   path: {:?}", template.root);
    if !manifest.description.trim().is_empty() {
        println!();
        println!("{}", manifest.description.trim());
    }

    if !manifest.variables.is_empty() {
        println!();
        println!("Variables:");
        for var in &manifest.variables {
            let mut details = vec![var.kind.to_string()];
            if var.kind == VariableKind::Choice {
                details.push(format!("one of {}", var.choices.join("|")));
            }
            match &var.default {
                Some(default) => details.push(format!("default {:?}", default)),
                None if var.required => details.push("required".to_string()),
                None => {}
            }
            println!("  {:<20} {} [{}]", var.name, var.description, details.join(", "));
        }
    }

    if !manifest.derived.is_empty() {
        println!();
        println!("Derived:");
        for derived in &manifest.derived {
            let transform = derived
                .transform
                .map(|t| format!(" ({:?})", t).to_lowercase())
                .unwrap_or_default();
            println!("  {:<20} = {}{}", derived.name, derived.value, transform);
        }
    }

    if !manifest.variants.is_empty() {
        println!();
        println!("Variants:");
        for variant in &manifest.variants {
            println!(
                "  {:<20} {} ({})",
                variant.name,
                variant.description,
                variant.path.display()
            );
        }
    }

    if !manifest.post_create.is_empty() {
        println!();
        println!("Post-create commands:");
        for command in &manifest.post_create {
            println!("  {}", command.join(" "));
        }
    }

    Ok(())
}
