//! modkit CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or unknown template
//! - 3: Validation failure
//! - 4: I/O failure
//! - 5: Destination conflict

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use modkit_templates::{ErrorKind, TemplateError};

mod commands;
mod config;
mod error;

use commands::{Cli, Commands};
use error::CliError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const IO_ERROR: u8 = 4;
    pub const DESTINATION_CONFLICT: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so that JSON reports on stdout stay parseable.
    let default_filter = if cli.verbose {
        "modkit=debug,modkit_templates=debug"
    } else if cli.quiet {
        "warn"
    } else {
        "warn,modkit=info"
    };
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::List(args) => commands::list::execute(args).await,
        Commands::Inspect(args) => commands::inspect::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<CliError>() {
            return match err {
                CliError::UnknownTemplate { .. } | CliError::InvalidArgument(_) => {
                    ExitCodes::INVALID_ARGS
                }
                CliError::ValidationFailed(_) => ExitCodes::VALIDATION_FAILURE,
            };
        }
        if let Some(err) = cause.downcast_ref::<TemplateError>() {
            if let TemplateError::NotFound(_) = err {
                return ExitCodes::INVALID_ARGS;
            }
            return match err.kind() {
                ErrorKind::Validation => ExitCodes::VALIDATION_FAILURE,
                ErrorKind::Conflict => ExitCodes::DESTINATION_CONFLICT,
                ErrorKind::Io => ExitCodes::IO_ERROR,
                ErrorKind::Other => ExitCodes::GENERAL_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}
