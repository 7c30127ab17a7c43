//! List command - Show available templates.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct ListArgs {
    /// Templates directory
    #[arg(long, env = "MODKIT_TEMPLATES")]
    pub templates_dir: Option<PathBuf>,
}

pub async fn execute(args: ListArgs) -> Result<()> {
    let templates_path = super::templates_path(args.templates_dir);
    let registry = super::load_registry(&templates_path)?;

    if registry.is_empty() {
        println!("⚠️  No templates found in {:?}", templates_path);
        return Ok(());
    }

    println!("📦 {} template(s) in {:?}\n", registry.len(), templates_path);
    for template in registry.list() {
        let manifest = &template.manifest;
        println!("  {} (v{})", manifest.id, manifest.version);
        println!("    {}", manifest.name);
        if !manifest.variants.is_empty() {
            println!("    variants: {}", manifest.variant_names().join(", "));
        }
    }

    Ok(())
}
