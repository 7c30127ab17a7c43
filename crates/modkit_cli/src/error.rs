//! CLI-level errors that carry their own exit code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Unknown template '{id}' (available: {available})")]
    UnknownTemplate { id: String, available: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} template(s) failed validation")]
    ValidationFailed(usize),
}
