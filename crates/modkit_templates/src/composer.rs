//! Project composition.
//!
//! Composition happens in two phases. [`ProjectComposer::plan`] walks the
//! template, renders every path and file in memory and checks the result
//! for collisions; template errors therefore never touch the destination.
//! [`ProjectComposer::write`] then materializes the plan through a
//! [`DestinationGuard`], which rolls back every change if a write fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::context::{SubstitutionContext, VariantSelection};
use crate::error::{TemplateError, TemplateResult};
use crate::guard::DestinationGuard;
use crate::loader::Template;
use crate::placeholder;
use crate::tree::{self, NodeKind};

/// What a planned entry materializes as.
#[derive(Debug, Clone)]
pub enum PlannedKind {
    Dir,
    File {
        contents: Vec<u8>,
        permissions: Option<fs::Permissions>,
        /// False when the contents were copied without substitution.
        rendered: bool,
    },
}

/// One output entry of a composition plan.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    /// Path relative to the template content root.
    pub source: PathBuf,
    /// Path relative to the destination.
    pub target: PathBuf,
    pub variant: Option<String>,
    pub kind: PlannedKind,
}

impl PlannedEntry {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, PlannedKind::File { .. })
    }
}

/// Fully rendered output of a template, in write order.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub template_id: String,
    pub entries: Vec<PlannedEntry>,
    /// Selected variants, in manifest order.
    pub variants: Vec<String>,
    /// Every variable referenced by paths or contents.
    pub referenced: BTreeSet<String>,
    /// Declared variables that nothing references, directly or through a
    /// derived variable.
    pub unused_variables: Vec<String>,
}

impl CompositionPlan {
    pub fn files(&self) -> impl Iterator<Item = &PlannedEntry> {
        self.entries.iter().filter(|e| e.is_file())
    }
}

/// Options for writing a plan.
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Allow a non-empty destination. Overwritten files are restored on rollback.
    pub overwrite: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl ComposeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Summary of a successful composition.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeResult {
    pub template_id: String,
    pub destination: PathBuf,
    /// Files written, relative to the destination.
    pub created_files: Vec<PathBuf>,
    pub created_dirs: usize,
    pub variants: Vec<String>,
    pub unused_variables: Vec<String>,
    pub warnings: Vec<String>,
}

/// Instantiates a template into a destination directory.
pub struct ProjectComposer<'a> {
    template: &'a Template,
}

impl<'a> ProjectComposer<'a> {
    pub fn new(template: &'a Template) -> Self {
        Self { template }
    }

    /// Render the selected parts of the template in memory.
    pub fn plan(
        &self,
        context: &SubstitutionContext,
        selection: &VariantSelection,
    ) -> TemplateResult<CompositionPlan> {
        let template = self.template;
        let nodes = tree::walk(template, |variant| selection.contains(variant))?;

        let mut entries = Vec::with_capacity(nodes.len());
        let mut referenced = BTreeSet::new();
        let mut targets: BTreeMap<PathBuf, (bool, PathBuf)> = BTreeMap::new();

        for node in nodes {
            let target = self.render_path(&node.relative, context, &mut referenced)?;
            let is_dir = node.kind == NodeKind::Dir;

            if let Some((existing_dir, existing_source)) = targets.get(&target) {
                if is_dir && *existing_dir {
                    // Two directories merging into one output directory.
                    continue;
                }
                return Err(self.collision(existing_source, &node.relative, &target));
            }
            targets.insert(target.clone(), (is_dir, node.relative.clone()));

            let kind = match node.kind {
                NodeKind::Dir => PlannedKind::Dir,
                NodeKind::File => self.render_file(&node.relative, context, &mut referenced)?,
            };

            entries.push(PlannedEntry {
                source: node.relative,
                target,
                variant: node.variant,
                kind,
            });
        }

        // A file must not be the parent of another output path.
        let keys: Vec<&PathBuf> = targets.keys().collect();
        for pair in keys.windows(2) {
            let (file, next) = (pair[0], pair[1]);
            let (is_dir, source) = &targets[file];
            if !is_dir && next.starts_with(file) {
                return Err(self.collision(source, &targets[next].1, next));
            }
        }

        let unused_variables = self.unused_variables(&referenced);
        let variants = template
            .manifest
            .variants
            .iter()
            .filter(|v| selection.contains(&v.name))
            .map(|v| v.name.clone())
            .collect();

        Ok(CompositionPlan {
            template_id: template.id().to_string(),
            entries,
            variants,
            referenced,
            unused_variables,
        })
    }

    /// Plan and write the project.
    pub fn compose(
        &self,
        context: &SubstitutionContext,
        selection: &VariantSelection,
        destination: &Path,
        options: &ComposeOptions,
    ) -> TemplateResult<ComposeResult> {
        let plan = self.plan(context, selection)?;
        self.write(&plan, destination, options)
    }

    /// Materialize a plan under `destination`, all or nothing.
    pub fn write(
        &self,
        plan: &CompositionPlan,
        destination: &Path,
        options: &ComposeOptions,
    ) -> TemplateResult<ComposeResult> {
        info!(
            "Instantiating template {} to {:?} (variants: [{}])",
            plan.template_id,
            destination,
            plan.variants.join(", ")
        );

        let mut guard = DestinationGuard::acquire(destination, options.overwrite)?;
        let mut created_files = Vec::new();
        let mut created_dirs = 0;

        for (index, entry) in plan.entries.iter().enumerate() {
            injected_failure(options, index)?;

            match &entry.kind {
                PlannedKind::Dir => {
                    guard.create_dir(&entry.target)?;
                    created_dirs += 1;
                }
                PlannedKind::File {
                    contents,
                    permissions,
                    rendered,
                } => {
                    guard.write_file(&entry.target, contents, permissions.as_ref())?;
                    debug!(
                        "{}: {:?}",
                        if *rendered { "Rendered" } else { "Copied" },
                        entry.target
                    );
                    created_files.push(entry.target.clone());
                }
            }
        }

        let destination = guard.commit();
        info!("Wrote {} files to {:?}", created_files.len(), destination);

        let warnings = plan
            .unused_variables
            .iter()
            .map(|name| format!("Variable '{}' is never referenced by the template", name))
            .collect();

        Ok(ComposeResult {
            template_id: plan.template_id.clone(),
            destination,
            created_files,
            created_dirs,
            variants: plan.variants.clone(),
            unused_variables: plan.unused_variables.clone(),
            warnings,
        })
    }

    /// Render each component of a template path into an output path.
    fn render_path(
        &self,
        relative: &Path,
        context: &SubstitutionContext,
        referenced: &mut BTreeSet<String>,
    ) -> TemplateResult<PathBuf> {
        let template_path = slashed(relative);
        let mut target = PathBuf::new();

        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let Some(name) = name.to_str() else {
                target.push(name);
                continue;
            };

            let rendered = placeholder::render(name, context)
                .map_err(|e| TemplateError::placeholder(&template_path, e))?;
            referenced.extend(rendered.referenced);

            // A value like `com/example/mod` expands into nested directories.
            for piece in rendered.text.split('/') {
                if piece.is_empty() || piece == "." || piece == ".." || piece.contains('\\') {
                    return Err(TemplateError::InvalidOutputPath {
                        template_path: template_path.clone(),
                        rendered: rendered.text.clone(),
                    });
                }
                target.push(piece);
            }
        }

        Ok(target)
    }

    fn render_file(
        &self,
        relative: &Path,
        context: &SubstitutionContext,
        referenced: &mut BTreeSet<String>,
    ) -> TemplateResult<PlannedKind> {
        let source = self.template.content_root.join(relative);
        let bytes = fs::read(&source).map_err(|e| TemplateError::io(&source, e))?;
        let permissions = fs::metadata(&source).ok().map(|m| m.permissions());

        if self.template.is_verbatim(relative) {
            return Ok(PlannedKind::File {
                contents: bytes,
                permissions,
                rendered: false,
            });
        }

        match String::from_utf8(bytes) {
            Ok(text) => {
                let rendered = placeholder::render(&text, context)
                    .map_err(|e| TemplateError::placeholder(slashed(relative), e))?;
                referenced.extend(rendered.referenced);
                Ok(PlannedKind::File {
                    contents: rendered.text.into_bytes(),
                    permissions,
                    rendered: true,
                })
            }
            Err(e) => {
                debug!("Copying non-UTF-8 file {:?} verbatim", relative);
                Ok(PlannedKind::File {
                    contents: e.into_bytes(),
                    permissions,
                    rendered: false,
                })
            }
        }
    }

    fn unused_variables(&self, referenced: &BTreeSet<String>) -> Vec<String> {
        let manifest = &self.template.manifest;
        let mut used: BTreeSet<String> = referenced.clone();

        for command in &manifest.post_create {
            for arg in command {
                if let Ok(names) = placeholder::placeholders(arg) {
                    used.extend(names.into_iter().map(String::from));
                }
            }
        }

        // Derived variables only reference earlier names, so one reverse
        // pass reaches everything they depend on.
        for derived in manifest.derived.iter().rev() {
            if used.contains(&derived.name) {
                if let Ok(names) = placeholder::placeholders(&derived.value) {
                    used.extend(names.into_iter().map(String::from));
                }
            }
        }

        manifest
            .variables
            .iter()
            .filter(|v| !used.contains(&v.name))
            .map(|v| v.name.clone())
            .collect()
    }

    fn collision(&self, first: &Path, second: &Path, target: &Path) -> TemplateError {
        TemplateError::InvalidManifest {
            template: self.template.id().to_string(),
            message: format!(
                "template paths {} and {} both produce {}",
                slashed(first),
                slashed(second),
                slashed(target)
            ),
        }
    }
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(not(test))]
fn injected_failure(_options: &ComposeOptions, _index: usize) -> TemplateResult<()> {
    Ok(())
}

#[cfg(test)]
fn injected_failure(options: &ComposeOptions, index: usize) -> TemplateResult<()> {
    if options.fail_after == Some(index) {
        return Err(TemplateError::io(
            format!("entry #{}", index),
            std::io::Error::other("injected failure"),
        ));
    }
    Ok(())
}
