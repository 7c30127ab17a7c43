//! Static checks over every file of a template.

use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::loader::Template;
use crate::manifest::BUILTIN_VARIABLES;
use crate::placeholder;
use crate::tree::{self, NodeKind};

/// Outcome of linting a template.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub template_id: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub files_checked: usize,
}

impl ValidationResult {
    pub fn new(template_id: &str) -> Self {
        Self {
            template_id: template_id.to_string(),
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            files_checked: 0,
        }
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.valid = false;
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Check every path and text file of every variant.
///
/// Malformed placeholders and references to undeclared variables are
/// errors, since generation would fail on them. Declared variables that
/// nothing references are warnings.
pub fn lint_template(template: &Template) -> TemplateResult<ValidationResult> {
    let manifest = &template.manifest;
    let mut result = ValidationResult::new(template.id());

    let known: BTreeSet<&str> = BUILTIN_VARIABLES
        .iter()
        .copied()
        .chain(manifest.variables.iter().map(|v| v.name.as_str()))
        .chain(manifest.derived.iter().map(|d| d.name.as_str()))
        .collect();
    let mut used: BTreeSet<String> = BTreeSet::new();

    for node in tree::walk(template, |_| true)? {
        let path = node.relative.to_string_lossy().replace('\\', "/");

        // Parent directories are nodes of their own.
        if let Some(name) = node.relative.file_name().and_then(|n| n.to_str()) {
            check_text(&path, name, &known, &mut used, &mut result);
        }

        if node.kind == NodeKind::File && !template.is_verbatim(&node.relative) {
            let source = node.source(template);
            let bytes = fs::read(&source).map_err(|e| TemplateError::io(&source, e))?;
            match String::from_utf8(bytes) {
                Ok(text) => check_text(&path, &text, &known, &mut used, &mut result),
                Err(_) => debug!("Skipping non-UTF-8 file {}", path),
            }
            result.files_checked += 1;
        }
    }

    for arg in manifest.post_create.iter().flatten() {
        if let Ok(names) = placeholder::placeholders(arg) {
            used.extend(names.into_iter().map(String::from));
        }
    }
    for derived in manifest.derived.iter().rev() {
        if used.contains(&derived.name) {
            if let Ok(names) = placeholder::placeholders(&derived.value) {
                used.extend(names.into_iter().map(String::from));
            }
        }
    }

    for var in &manifest.variables {
        if !used.contains(&var.name) {
            result.add_warning(format!(
                "Variable '{}' is declared but never referenced",
                var.name
            ));
        }
    }

    Ok(result)
}

fn check_text(
    path: &str,
    text: &str,
    known: &BTreeSet<&str>,
    used: &mut BTreeSet<String>,
    result: &mut ValidationResult,
) {
    match placeholder::placeholders(text) {
        Ok(names) => {
            for name in names {
                if !known.contains(name) {
                    result.add_error(format!(
                        "{}: placeholder {{{{{}}}}} does not name a declared variable",
                        path, name
                    ));
                }
                used.insert(name.to_string());
            }
        }
        Err(e) => result.add_error(TemplateError::placeholder(path, e).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::loader::TemplateLoader;

    fn lint(files: &[(&str, &str)]) -> ValidationResult {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("tpl");
        fs::create_dir_all(dir.join("template/fabric")).unwrap();
        fs::write(
            dir.join("template.yaml"),
            r#"
id: tpl
name: Tpl
variables:
  - name: mod_id
    default: examplemod
  - name: mod_name
    default: Example Mod
  - name: license
    default: MIT
derived:
  - name: main_class
    value: "{{mod_name}}"
    transform: pascal
variants:
  - name: fabric
    path: fabric
"#,
        )
        .unwrap();
        for (path, content) in files {
            let path = dir.join("template").join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let template = TemplateLoader::new(temp.path()).load_template(&dir).unwrap();
        lint_template(&template).unwrap()
    }

    #[test]
    fn test_clean_template() {
        let result = lint(&[
            ("fabric/{{main_class}}.java", "class {{main_class}} {}"),
            ("README.md", "{{mod_id}} ({{year}}) {{license}}"),
        ]);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.files_checked, 2);
    }

    #[test]
    fn test_reports_problems_across_variants() {
        let result = lint(&[
            ("fabric/Broken.java", "{{mod_id"),
            ("{{undeclared}}.txt", "{{mod_id}}"),
        ]);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2, "{:?}", result.errors);
        assert!(result.errors.iter().any(|e| e.contains("fabric/Broken.java")));
        assert!(result.errors.iter().any(|e| e.contains("{{undeclared}}")));
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings.iter().any(|w| w.contains("'mod_name'")));
        assert!(result.warnings.iter().any(|w| w.contains("'license'")));
    }
}
