//! # modkit_templates
//!
//! Template loading and project composition for modkit.
//!
//! A template is a directory tree whose file names and contents may carry
//! `{{variable}}` placeholders, described by a `template.yaml` manifest.
//! The manifest declares:
//!
//! - Variables, with kinds, defaults and validation patterns
//! - Derived variables computed from other values
//! - Loader variants: subtrees included only when selected
//! - Ignore and verbatim globs, and optional post-create commands
//!
//! Composition is all or nothing: everything is rendered in memory first,
//! and any failure while writing rolls the destination back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modkit_templates::{ComposeOptions, ContextBuilder, ProjectComposer, TemplateLoader};
//! use std::path::Path;
//!
//! // Load templates from directory
//! let loader = TemplateLoader::new("templates");
//! let registry = loader.load_all().unwrap();
//! let template = registry.get("minecraft-mod").unwrap();
//!
//! // Resolve variables and variants
//! let (context, variants) = ContextBuilder::new(&template.manifest)
//!     .variable("mod_name", "Example Mod")
//!     .variant("fabric")
//!     .build()
//!     .unwrap();
//!
//! let result = ProjectComposer::new(template)
//!     .compose(&context, &variants, Path::new("./example-mod"), &ComposeOptions::new())
//!     .unwrap();
//! println!("{} files written", result.created_files.len());
//! ```

pub mod case;
pub mod composer;
pub mod context;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod lint;
pub mod loader;
pub mod manifest;
pub mod placeholder;
pub mod tree;

pub use case::Transform;
pub use composer::{
    ComposeOptions, ComposeResult, CompositionPlan, PlannedEntry, PlannedKind, ProjectComposer,
};
pub use context::{ContextBuilder, SubstitutionContext, VariantSelection};
pub use error::{ErrorKind, TemplateError, TemplateResult};
pub use guard::DestinationGuard;
pub use lint::{lint_template, ValidationResult};
pub use loader::{Template, TemplateLoader, TemplateRegistry};
pub use manifest::{
    DerivedVariable, LoaderVariant, TemplateManifest, TemplateVariable, VariableKind,
};
