//! Commands run inside a freshly generated project.
//!
//! Hooks only run after the composition has been committed. A failing hook
//! is reported but the generated project is kept.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::context::SubstitutionContext;
use crate::error::{TemplateError, TemplateResult};
use crate::loader::Template;
use crate::placeholder;

/// Check if Git is available on the system.
pub fn is_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Initialize a Git repository in `destination`.
///
/// Returns false when the directory already is a repository.
pub fn git_init(destination: &Path) -> TemplateResult<bool> {
    if destination.join(".git").exists() {
        debug!("Repository already initialized at {:?}", destination);
        return Ok(false);
    }

    info!("Initializing Git repository at {}", destination.display());
    run(&["git".to_string(), "init".to_string()], destination)?;
    Ok(true)
}

/// Run the manifest's `post_create` commands in `destination`, in order.
///
/// Arguments are rendered against `context` first. Returns the number of
/// commands run.
pub fn run_post_create(
    template: &Template,
    context: &SubstitutionContext,
    destination: &Path,
) -> TemplateResult<usize> {
    for (index, command) in template.manifest.post_create.iter().enumerate() {
        let argv = command
            .iter()
            .map(|arg| {
                placeholder::render(arg, context)
                    .map(|r| r.text)
                    .map_err(|e| {
                        TemplateError::placeholder(format!("post_create command #{}", index + 1), e)
                    })
            })
            .collect::<TemplateResult<Vec<_>>>()?;

        info!("Running post-create command: {}", argv.join(" "));
        run(&argv, destination)?;
    }
    Ok(template.manifest.post_create.len())
}

fn run(argv: &[String], dir: &Path) -> TemplateResult<()> {
    let command = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| TemplateError::PostCreateFailed {
        command: command.clone(),
        message: "empty command".to_string(),
    })?;

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| TemplateError::PostCreateFailed {
            command: command.clone(),
            message: format!("failed to start: {}", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            stderr => stderr.to_string(),
        };
        return Err(TemplateError::PostCreateFailed { command, message });
    }

    debug!("{}: {}", command, String::from_utf8_lossy(&output.stdout).trim());
    Ok(())
}
