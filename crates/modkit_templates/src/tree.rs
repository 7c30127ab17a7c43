//! Deterministic traversal of a template's content tree.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{TemplateError, TemplateResult};
use crate::loader::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    /// Regular file, or a symlink whose target is read as the contents.
    File,
}

/// A file or directory of the template, relative to its content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNode {
    pub relative: PathBuf,
    pub kind: NodeKind,
    /// Variant whose subtree contains this node, if any.
    pub variant: Option<String>,
}

impl TemplateNode {
    pub fn source(&self, template: &Template) -> PathBuf {
        template.content_root.join(&self.relative)
    }
}

fn variant_of(template: &Template, relative: &Path) -> Option<String> {
    template
        .manifest
        .variants
        .iter()
        .find(|v| relative.starts_with(&v.path))
        .map(|v| v.name.clone())
}

fn relative_of<'a>(template: &Template, entry: &'a DirEntry) -> &'a Path {
    entry
        .path()
        .strip_prefix(&template.content_root)
        .unwrap_or_else(|_| entry.path())
}

/// Walk the content root in lexicographic order, directories before their
/// children.
///
/// Ignored paths and subtrees of variants rejected by `include_variant` are
/// neither descended into nor returned.
pub fn walk<F>(template: &Template, include_variant: F) -> TemplateResult<Vec<TemplateNode>>
where
    F: Fn(&str) -> bool,
{
    let mut nodes = Vec::new();

    let entries = WalkDir::new(&template.content_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let relative = relative_of(template, entry);
            if template.is_ignored(relative) {
                return false;
            }
            match variant_of(template, relative) {
                Some(variant) => include_variant(&variant),
                None => true,
            }
        });

    for entry in entries {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| template.content_root.clone());
            TemplateError::io(path, e.into())
        })?;

        let relative = relative_of(template, &entry).to_path_buf();
        let kind = if entry.file_type().is_dir() {
            NodeKind::Dir
        } else if entry.path_is_symlink() && entry.path().is_dir() {
            // Links are not followed, so the target would be read as a file.
            return Err(TemplateError::InvalidManifest {
                template: template.id().to_string(),
                message: format!(
                    "{} is a symlink to a directory, which is not supported",
                    relative.to_string_lossy().replace('\\', "/")
                ),
            });
        } else {
            NodeKind::File
        };
        let variant = variant_of(template, &relative);
        nodes.push(TemplateNode {
            relative,
            kind,
            variant,
        });
    }

    Ok(nodes)
}
