//! Template manifest definitions.
//!
//! A manifest (`template.yaml`) declares the variables a template accepts,
//! the variables derived from them, and the optional variant subtrees
//! (e.g. one per mod loader) that a generation run may include.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::case::Transform;
use crate::error::{TemplateError, TemplateResult};
use crate::placeholder::{self, is_identifier};

/// Variables every run provides without a declaration.
pub const BUILTIN_VARIABLES: &[&str] = &["year", "template_id", "selected_variants"];

/// Semantic kind of a template variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Letters, digits and underscores, not starting with a digit.
    Identifier,
    /// Dot-separated identifiers, e.g. `com.example.mod`.
    Package,
    /// Free text.
    #[default]
    Text,
    /// One of the declared `choices`.
    Choice,
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableKind::Identifier => "identifier",
            VariableKind::Package => "package",
            VariableKind::Text => "text",
            VariableKind::Choice => "choice",
        };
        f.write_str(name)
    }
}

/// Template variable definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

impl TemplateVariable {
    /// Check a value against this variable's kind, choices and pattern.
    pub fn check_value(&self, value: &str) -> Result<(), String> {
        match self.kind {
            VariableKind::Identifier if !is_identifier(value) => {
                return Err(format!("'{}' is not a valid identifier", value));
            }
            VariableKind::Package if !value.split('.').all(is_identifier) => {
                return Err(format!(
                    "'{}' is not a valid package (expected dot-separated identifiers)",
                    value
                ));
            }
            VariableKind::Choice if !self.choices.iter().any(|c| c == value) => {
                return Err(format!(
                    "'{}' is not one of: {}",
                    value,
                    self.choices.join(", ")
                ));
            }
            _ => {}
        }

        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
            if !re.is_match(value) {
                return Err(format!("'{}' does not match pattern: {}", value, pattern));
            }
        }

        Ok(())
    }
}

/// A variable computed from other variables after user input is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedVariable {
    pub name: String,
    /// Template string; may reference declared, built-in and earlier derived variables.
    pub value: String,
    /// Applied to every value substituted into `value`, not to its literal text.
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub description: String,
}

/// An optional subtree included or excluded as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderVariant {
    pub name: String,
    /// Subtree root, relative to the template content root.
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Template manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateManifest {
    /// Unique template identifier
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub derived: Vec<DerivedVariable>,
    #[serde(default)]
    pub variants: Vec<LoaderVariant>,
    /// Globs (relative to the content root) that are never copied
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Globs copied byte-for-byte; their names are still rendered
    #[serde(default)]
    pub verbatim: Vec<String>,
    /// Commands run in the generated project on request, as argv lists
    #[serde(default)]
    pub post_create: Vec<Vec<String>>,
}

impl TemplateManifest {
    /// Get a declared variable by name.
    pub fn variable(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Get required variables.
    pub fn required_variables(&self) -> Vec<&TemplateVariable> {
        self.variables.iter().filter(|v| v.required).collect()
    }

    pub fn variant(&self, name: &str) -> Option<&LoaderVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }

    /// Collect every inconsistency between the manifest and its content root.
    pub fn check(&self, content_root: &Path) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push("Template id must not be empty".to_string());
        }

        let mut known: HashSet<&str> = BUILTIN_VARIABLES.iter().copied().collect();

        for var in &self.variables {
            if !check_name(&var.name, &known, &mut issues) {
                continue;
            }
            known.insert(&var.name);

            if let Some(pattern) = &var.pattern {
                if let Err(e) = Regex::new(pattern) {
                    issues.push(format!("Variable '{}' has an invalid pattern: {}", var.name, e));
                    continue;
                }
            }

            if var.kind == VariableKind::Choice && var.choices.is_empty() {
                issues.push(format!("Choice variable '{}' declares no choices", var.name));
                continue;
            }

            if let Some(default) = &var.default {
                if let Err(msg) = var.check_value(default) {
                    issues.push(format!(
                        "Default for {} variable '{}' is invalid: {}",
                        var.kind, var.name, msg
                    ));
                }
            }
        }

        for derived in &self.derived {
            if !check_name(&derived.name, &known, &mut issues) {
                continue;
            }
            check_references(
                &format!("derived variable '{}'", derived.name),
                &derived.value,
                &known,
                &mut issues,
            );
            known.insert(&derived.name);
        }

        self.check_variants(content_root, &mut issues);

        for glob in self.ignore.iter().chain(&self.verbatim) {
            if let Err(e) = glob::Pattern::new(glob) {
                issues.push(format!("Invalid glob '{}': {}", glob, e));
            }
        }

        for (index, command) in self.post_create.iter().enumerate() {
            if command.is_empty() {
                issues.push(format!("post_create command #{} is empty", index + 1));
            }
            for arg in command {
                check_references(
                    &format!("post_create command #{}", index + 1),
                    arg,
                    &known,
                    &mut issues,
                );
            }
        }

        issues
    }

    fn check_variants(&self, content_root: &Path, issues: &mut Vec<String>) {
        let mut names = HashSet::new();
        let mut paths: Vec<&Path> = Vec::new();

        for variant in &self.variants {
            if !is_identifier(&variant.name) {
                issues.push(format!("Invalid variant name '{}'", variant.name));
            }
            if !names.insert(variant.name.as_str()) {
                issues.push(format!("Duplicate variant '{}'", variant.name));
            }

            let path = variant.path.as_path();
            let escapes = path.as_os_str().is_empty()
                || path
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)));
            if escapes {
                issues.push(format!(
                    "Variant '{}' path {:?} must be a plain relative path",
                    variant.name, path
                ));
                continue;
            }

            if !content_root.join(path).is_dir() {
                issues.push(format!(
                    "Variant '{}' subtree does not exist: {}",
                    variant.name,
                    path.display()
                ));
            }

            for other in &paths {
                if other == &path {
                    issues.push(format!(
                        "Variant '{}' reuses subtree {}",
                        variant.name,
                        path.display()
                    ));
                } else if other.starts_with(path) || path.starts_with(other) {
                    issues.push(format!(
                        "Variant subtrees {} and {} are nested",
                        other.display(),
                        path.display()
                    ));
                }
            }
            paths.push(path);
        }
    }

    /// Validate the manifest, failing with `InvalidManifest` on any issue.
    pub fn validate(&self, content_root: &Path) -> TemplateResult<()> {
        let issues = self.check(content_root);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::InvalidManifest {
                template: self.id.clone(),
                message: issues.join("; "),
            })
        }
    }
}

fn check_name(name: &str, known: &HashSet<&str>, issues: &mut Vec<String>) -> bool {
    if !is_identifier(name) {
        issues.push(format!("Invalid variable name '{}'", name));
        false
    } else if BUILTIN_VARIABLES.contains(&name) {
        issues.push(format!("Variable name '{}' is reserved", name));
        false
    } else if known.contains(name) {
        issues.push(format!("Duplicate variable '{}'", name));
        false
    } else {
        true
    }
}

fn check_references(what: &str, text: &str, known: &HashSet<&str>, issues: &mut Vec<String>) {
    match placeholder::placeholders(text) {
        Ok(names) => {
            for name in names {
                if !known.contains(name) {
                    issues.push(format!("{} references unknown variable '{}'", what, name));
                }
            }
        }
        Err(e) => issues.push(format!("{} is malformed: {}", what, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
id: mod
name: Mod
variables:
  - name: mod_id
    kind: identifier
    required: true
    pattern: "^[a-z][a-z0-9_]*$"
  - name: package
    kind: package
    default: com.example.mod
  - name: java_version
    kind: choice
    choices: ["17", "21"]
    default: "21"
derived:
  - name: package_path
    value: "{{package}}"
    transform: path
  - name: main_class_name
    value: "{{mod_id}}Mod"
    transform: pascal
variants:
  - name: fabric
    path: fabric
  - name: forge
    path: forge
"#;

    fn content_root(dirs: &[&str]) -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        for dir in dirs {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        temp
    }

    fn parse(yaml: &str) -> TemplateManifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_manifest_parses() {
        let manifest = parse(MANIFEST);
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.variant_names(), vec!["fabric", "forge"]);
        assert_eq!(manifest.variable("java_version").unwrap().kind, VariableKind::Choice);
        assert_eq!(manifest.derived[0].transform, Some(Transform::Path));
        assert_eq!(manifest.required_variables().len(), 1);
    }

    #[test]
    fn test_valid_manifest_has_no_issues() {
        let root = content_root(&["fabric", "forge"]);
        let manifest = parse(MANIFEST);
        assert!(manifest.check(root.path()).is_empty(), "{:?}", manifest.check(root.path()));
        assert!(manifest.validate(root.path()).is_ok());
    }

    #[test]
    fn test_missing_variant_subtree() {
        let root = content_root(&["fabric"]);
        let err = parse(MANIFEST).validate(root.path()).unwrap_err();
        match err {
            TemplateError::InvalidManifest { template, message } => {
                assert_eq!(template, "mod");
                assert!(message.contains("'forge' subtree does not exist"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_and_reserved_variables() {
        let root = content_root(&[]);
        let manifest = parse(
            r#"
id: t
name: T
variables:
  - name: a
  - name: a
  - name: year
  - name: bad-name
"#,
        );
        let issues = manifest.check(root.path());
        assert!(issues.iter().any(|i| i == "Duplicate variable 'a'"));
        assert!(issues.iter().any(|i| i == "Variable name 'year' is reserved"));
        assert!(issues.iter().any(|i| i == "Invalid variable name 'bad-name'"));
    }

    #[test]
    fn test_defaults_must_satisfy_kind() {
        let root = content_root(&[]);
        let manifest = parse(
            r#"
id: t
name: T
variables:
  - name: mod_id
    kind: identifier
    default: "not an id"
  - name: package
    kind: package
    default: "com..example"
  - name: loader
    kind: choice
    choices: [fabric]
    default: quilt
  - name: empty_choice
    kind: choice
"#,
        );
        let issues = manifest.check(root.path());
        assert_eq!(issues.len(), 4, "{:?}", issues);
        assert!(issues[0].contains("identifier variable 'mod_id'"));
        assert!(issues[1].contains("package variable 'package'"));
        assert!(issues[2].contains("'quilt' is not one of: fabric"));
        assert!(issues[3].contains("declares no choices"));
    }

    #[test]
    fn test_derived_references_must_be_known_and_earlier() {
        let root = content_root(&[]);
        let manifest = parse(
            r#"
id: t
name: T
variables:
  - name: a
derived:
  - name: first
    value: "{{second}}-{{a}}"
  - name: second
    value: "{{a}}{{year}}"
  - name: broken
    value: "{{a"
"#,
        );
        let issues = manifest.check(root.path());
        assert_eq!(issues.len(), 2, "{:?}", issues);
        assert!(issues[0].contains("'first' references unknown variable 'second'"));
        assert!(issues[1].contains("derived variable 'broken' is malformed"));
    }

    #[test]
    fn test_nested_and_escaping_variants() {
        let root = content_root(&["loaders/fabric"]);
        let manifest = parse(
            r#"
id: t
name: T
variants:
  - name: loaders
    path: loaders
  - name: fabric
    path: loaders/fabric
  - name: evil
    path: ../outside
"#,
        );
        let issues = manifest.check(root.path());
        assert!(issues.iter().any(|i| i.contains("are nested")));
        assert!(issues.iter().any(|i| i.contains("must be a plain relative path")));
    }

    #[test]
    fn test_check_value() {
        let var = TemplateVariable {
            name: "mod_id".into(),
            description: String::new(),
            kind: VariableKind::Identifier,
            default: None,
            required: true,
            pattern: Some("^[a-z_]+$".into()),
            choices: Vec::new(),
        };
        assert!(var.check_value("examplemod").is_ok());
        assert!(var.check_value("Example").is_err());
        assert!(var.check_value("example-mod").is_err());
    }
}
