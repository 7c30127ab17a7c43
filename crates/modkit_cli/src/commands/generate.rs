//! Generate command - Create a new project from a template.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use modkit_templates::hooks;
use modkit_templates::{
    ComposeOptions, ComposeResult, CompositionPlan, ContextBuilder, ProjectComposer,
    SubstitutionContext, Template,
};

use crate::config::{parse_assignment, GenerateConfig, OutputFormat};
use crate::error::CliError;

#[derive(Args)]
pub struct GenerateArgs {
    /// Destination directory for the new project
    pub destination: Option<PathBuf>,

    /// Template to use (optional when only one template is available)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Templates directory
    #[arg(long, env = "MODKIT_TEMPLATES")]
    pub templates_dir: Option<PathBuf>,

    /// Set a template variable
    #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Loader variant to include (repeatable or comma-separated)
    #[arg(long = "variant", value_name = "NAME", value_delimiter = ',')]
    pub variants: Vec<String>,

    /// Write into a non-empty destination
    #[arg(short, long)]
    pub force: bool,

    /// Show what would be generated without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Read inputs from a YAML, JSON or TOML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Initialize a Git repository in the new project
    #[arg(long)]
    pub git: bool,

    /// Run the template's post-create commands
    #[arg(long)]
    pub post_create: bool,

    /// Report format
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,
}

/// Inputs after merging the config file with command-line flags.
struct Request {
    template: Option<String>,
    destination: PathBuf,
    variables: Vec<(String, String)>,
    variants: Vec<String>,
    overwrite: bool,
    dry_run: bool,
    git: bool,
    post_create: bool,
    format: OutputFormat,
}

impl Request {
    fn merge(args: GenerateArgs, config: GenerateConfig) -> Result<Self, CliError> {
        let destination = args
            .destination
            .or_else(|| config.destination.clone())
            .ok_or_else(|| {
                CliError::InvalidArgument("a destination directory is required".to_string())
            })?;

        // File values first so that --set wins.
        let mut variables: Vec<(String, String)> = config.variables().collect();
        variables.extend(args.set);

        let variants = if args.variants.is_empty() {
            config.variants
        } else {
            args.variants
        };

        Ok(Self {
            template: args.template.or(config.template),
            destination,
            variables,
            variants,
            overwrite: args.force || config.overwrite,
            dry_run: args.dry_run,
            git: args.git || config.git,
            post_create: args.post_create || config.post_create,
            format: args.output_format.or(config.output_format).unwrap_or_default(),
        })
    }
}

/// Dry-run report.
#[derive(Serialize)]
struct PlanReport {
    template_id: String,
    destination: PathBuf,
    dry_run: bool,
    files: Vec<PathBuf>,
    directories: usize,
    variants: Vec<String>,
    unused_variables: Vec<String>,
}

impl PlanReport {
    fn new(plan: &CompositionPlan, destination: PathBuf) -> Self {
        Self {
            template_id: plan.template_id.clone(),
            destination,
            dry_run: true,
            files: plan.files().map(|e| e.target.clone()).collect(),
            directories: plan.entries.len() - plan.files().count(),
            variants: plan.variants.clone(),
            unused_variables: plan.unused_variables.clone(),
        }
    }
}

pub async fn execute(args: GenerateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => GenerateConfig::load(path)?,
        None => GenerateConfig::default(),
    };
    let templates_path = super::templates_path(args.templates_dir.clone());
    let request = Request::merge(args, config)?;

    let template = super::resolve_template(&templates_path, request.template.as_deref())?;
    info!("Using template: {} ({})", template.manifest.name, template.id());

    tokio::task::spawn_blocking(move || run(&template, &request))
        .await
        .context("Generation task panicked")?
}

/// Resolve, plan and write. Blocking.
fn run(template: &Template, request: &Request) -> Result<()> {
    let (context, selection) = ContextBuilder::new(&template.manifest)
        .variables(request.variables.iter().cloned())
        .variants(request.variants.iter().cloned())
        .build()?;
    for (name, value) in context.iter() {
        debug!("{} = {:?}", name, value);
    }

    let composer = ProjectComposer::new(template);
    let plan = composer.plan(&context, &selection)?;

    if request.dry_run {
        let report = PlanReport::new(&plan, request.destination.clone());
        return print_plan(&report, request.format);
    }

    let options = ComposeOptions::new().overwrite(request.overwrite);
    let result = composer.write(&plan, &request.destination, &options)?;
    print_result(&result, request.format)?;

    if request.git && hooks::git_init(&result.destination)? {
        info!("Initialized Git repository in {:?}", result.destination);
    }
    if request.post_create {
        let ran = run_post_create(template, &context, &result)?;
        info!("Ran {} post-create command(s)", ran);
    }

    Ok(())
}

fn run_post_create(
    template: &Template,
    context: &SubstitutionContext,
    result: &ComposeResult,
) -> Result<usize> {
    hooks::run_post_create(template, context, &result.destination).with_context(|| {
        format!(
            "Project was created at {:?}, but a post-create command failed",
            result.destination
        )
    })
}

fn print_plan(report: &PlanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!(
                "🔍 Dry run: {} would create {} file(s) in {:?}",
                report.template_id,
                report.files.len(),
                report.destination
            );
            if !report.variants.is_empty() {
                println!("   Variants: {}", report.variants.join(", "));
            }
            for file in &report.files {
                println!("   + {}", file.display());
            }
            for name in &report.unused_variables {
                println!("   ⚠️  Variable '{}' is never referenced", name);
            }
        }
    }
    Ok(())
}

fn print_result(result: &ComposeResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            println!(
                "✅ Project created from '{}' ({} files)",
                result.template_id,
                result.created_files.len()
            );
            println!();
            println!("Location: {:?}", result.destination);
            if !result.variants.is_empty() {
                println!("Variants: {}", result.variants.join(", "));
            }
            for warning in &result.warnings {
                println!("⚠️  {}", warning);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use clap::Parser;

    use crate::commands::{Cli, Commands};
    use crate::config::ConfigValue;

    fn args(argv: &[&str]) -> GenerateArgs {
        let cli = Cli::try_parse_from(["modkit", "generate"].iter().chain(argv)).unwrap();
        match cli.command {
            Commands::Generate(args) => args,
            _ => panic!("expected generate"),
        }
    }

    fn config() -> GenerateConfig {
        GenerateConfig {
            template: Some("from-file".to_string()),
            destination: Some(PathBuf::from("file-out")),
            variables: BTreeMap::from([
                ("mod_id".to_string(), ConfigValue::Text("filemod".to_string())),
                ("java_version".to_string(), ConfigValue::Integer(17)),
            ]),
            variants: vec!["forge".to_string(), "neoforge".to_string()],
            output_format: Some(OutputFormat::Json),
            ..GenerateConfig::default()
        }
    }

    /// Effective values, applied in order as the context builder does.
    fn effective(request: &Request) -> BTreeMap<&str, &str> {
        request
            .variables
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn test_command_line_overrides_config_file() {
        let request = Request::merge(
            args(&[
                "cli-out",
                "--template",
                "from-cli",
                "--set",
                "mod_id=climod",
                "--variant",
                "fabric",
                "--output-format",
                "text",
            ]),
            config(),
        )
        .unwrap();

        assert_eq!(request.destination, PathBuf::from("cli-out"));
        assert_eq!(request.template.as_deref(), Some("from-cli"));
        assert_eq!(request.variants, vec!["fabric"]);
        assert_eq!(request.format, OutputFormat::Text);

        let values = effective(&request);
        assert_eq!(values["mod_id"], "climod");
        assert_eq!(values["java_version"], "17");
    }

    #[test]
    fn test_config_file_fills_missing_flags() {
        let request = Request::merge(args(&["--force"]), config()).unwrap();

        assert_eq!(request.destination, PathBuf::from("file-out"));
        assert_eq!(request.template.as_deref(), Some("from-file"));
        assert_eq!(request.variants, vec!["forge", "neoforge"]);
        assert_eq!(request.format, OutputFormat::Json);
        assert!(request.overwrite);
        assert_eq!(effective(&request)["mod_id"], "filemod");
    }

    #[test]
    fn test_missing_destination_is_an_invalid_argument() {
        let err = Request::merge(args(&[]), GenerateConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }
}
