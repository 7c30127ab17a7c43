//! Error types for templates.

use std::path::PathBuf;
use thiserror::Error;

use crate::placeholder::PlaceholderError;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Invalid manifest in template {template}: {message}")]
    InvalidManifest { template: String, message: String },

    #[error("Malformed placeholder in {path} at byte {offset} ({snippet:?}): {reason}")]
    MalformedPlaceholder {
        path: String,
        offset: usize,
        snippet: String,
        reason: String,
    },

    #[error("Unresolved placeholder {{{{{name}}}}} in {path} at byte {offset}")]
    UnresolvedPlaceholder {
        path: String,
        name: String,
        offset: usize,
    },

    #[error("Variable not provided: {0}")]
    MissingVariable(String),

    #[error("Invalid variable value for {variable}: {message}")]
    InvalidVariable { variable: String, message: String },

    #[error("Unknown variant '{variant}' (available: {available})")]
    UnknownVariant { variant: String, available: String },

    #[error("Template path {template_path} renders to invalid output path {rendered:?}")]
    InvalidOutputPath {
        template_path: String,
        rendered: String,
    },

    #[error("Destination is not empty: {0}")]
    DestinationNotEmpty(PathBuf),

    #[error("Destination is in use by another run: {path} (lock file {lock})")]
    DestinationBusy { path: PathBuf, lock: PathBuf },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Post-create command `{command}` failed: {message}")]
    PostCreateFailed { command: String, message: String },
}

/// Coarse error classification, used to pick process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Template authoring or invocation problem. Nothing was written.
    Validation,
    /// Destination precondition violated. Nothing was written.
    Conflict,
    /// Environment failure. Any partial output was rolled back.
    Io,
    Other,
}

impl TemplateError {
    /// Wrap an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TemplateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach a template path to a substitution engine error.
    pub fn placeholder(path: impl Into<String>, err: PlaceholderError) -> Self {
        let path = path.into();
        match err {
            PlaceholderError::Malformed {
                offset,
                snippet,
                reason,
            } => TemplateError::MalformedPlaceholder {
                path,
                offset,
                snippet,
                reason: reason.to_string(),
            },
            PlaceholderError::Unresolved { name, offset } => {
                TemplateError::UnresolvedPlaceholder { path, name, offset }
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::InvalidManifest { .. }
            | TemplateError::MalformedPlaceholder { .. }
            | TemplateError::UnresolvedPlaceholder { .. }
            | TemplateError::MissingVariable(_)
            | TemplateError::InvalidVariable { .. }
            | TemplateError::UnknownVariant { .. }
            | TemplateError::InvalidOutputPath { .. } => ErrorKind::Validation,
            TemplateError::DestinationNotEmpty(_) | TemplateError::DestinationBusy { .. } => {
                ErrorKind::Conflict
            }
            TemplateError::Io { .. } => ErrorKind::Io,
            TemplateError::NotFound(_) | TemplateError::PostCreateFailed { .. } => {
                ErrorKind::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::MalformedReason;

    #[test]
    fn test_placeholder_errors_carry_path() {
        let err = TemplateError::placeholder(
            "common/Constants.java",
            PlaceholderError::Unresolved {
                name: "mod_id".into(),
                offset: 12,
            },
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Unresolved placeholder {{mod_id}} in common/Constants.java at byte 12"
        );

        let err = TemplateError::placeholder(
            "README.md",
            PlaceholderError::Malformed {
                offset: 0,
                snippet: "{{a {{b}}".into(),
                reason: MalformedReason::Nested,
            },
        );
        assert!(matches!(
            err,
            TemplateError::MalformedPlaceholder { ref path, .. } if path == "README.md"
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            TemplateError::DestinationNotEmpty(PathBuf::from("out")).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            TemplateError::io("out", std::io::Error::other("disk full")).kind(),
            ErrorKind::Io
        );
    }
}
