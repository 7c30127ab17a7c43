//! Substitution context resolution.
//!
//! A [`SubstitutionContext`] is built once per generation run from the
//! manifest defaults, the caller's values, the built-in variables and the
//! manifest's derived variables. It is immutable afterwards.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::TemplateManifest;
use crate::placeholder;

/// Resolved variable values for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SubstitutionContext {
    values: BTreeMap<String, String>,
}

impl SubstitutionContext {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstitutionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The set of variants selected for a run. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariantSelection {
    names: BTreeSet<String>,
}

impl VariantSelection {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for VariantSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Builds the context and variant selection for a manifest.
pub struct ContextBuilder<'a> {
    manifest: &'a TemplateManifest,
    provided: BTreeMap<String, String>,
    variants: Vec<String>,
    year: Option<i32>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(manifest: &'a TemplateManifest) -> Self {
        Self {
            manifest,
            provided: BTreeMap::new(),
            variants: Vec::new(),
            year: None,
        }
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.provided.insert(name.into(), value.into());
        self
    }

    pub fn variables<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.provided
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.variants.push(name.into());
        self
    }

    pub fn variants<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.variants.extend(names.into_iter().map(Into::into));
        self
    }

    /// Pin the `year` built-in instead of reading the clock.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Resolve every variable and the variant selection.
    pub fn build(self) -> TemplateResult<(SubstitutionContext, VariantSelection)> {
        let manifest = self.manifest;
        let selection = self.resolve_variants()?;

        for name in self.provided.keys() {
            if manifest.variable(name).is_none() {
                warn!(
                    "Ignoring value for '{}': not a declared variable of template {}",
                    name, manifest.id
                );
            }
        }

        let mut values = BTreeMap::new();
        let mut missing = Vec::new();

        for var in &manifest.variables {
            let value = match self.provided.get(&var.name).or(var.default.as_ref()) {
                Some(value) => value.clone(),
                None if var.required => {
                    missing.push(var.name.clone());
                    continue;
                }
                None => String::new(),
            };

            if !value.is_empty() || var.required {
                var.check_value(&value)
                    .map_err(|message| TemplateError::InvalidVariable {
                        variable: var.name.clone(),
                        message,
                    })?;
            }
            values.insert(var.name.clone(), value);
        }

        if !missing.is_empty() {
            return Err(TemplateError::MissingVariable(missing.join(", ")));
        }

        let year = self.year.unwrap_or_else(|| chrono::Local::now().year());
        let selected: Vec<&str> = manifest
            .variants
            .iter()
            .map(|v| v.name.as_str())
            .filter(|name| selection.contains(name))
            .collect();
        values.insert("year".to_string(), year.to_string());
        values.insert("template_id".to_string(), manifest.id.clone());
        values.insert("selected_variants".to_string(), selected.join(","));

        for derived in &manifest.derived {
            let rendered = placeholder::render_with(&derived.value, |name| {
                values.get(name).map(|v| match derived.transform {
                    Some(transform) => Cow::Owned(transform.apply(v)),
                    None => Cow::Borrowed(v.as_str()),
                })
            })
            .map_err(|e| {
                TemplateError::placeholder(format!("derived variable '{}'", derived.name), e)
            })?;
            debug!("Derived {} = {:?}", derived.name, rendered.text);
            values.insert(derived.name.clone(), rendered.text);
        }

        Ok((SubstitutionContext { values }, selection))
    }

    fn resolve_variants(&self) -> TemplateResult<VariantSelection> {
        let available = self.manifest.variant_names();
        for name in &self.variants {
            if !available.contains(&name.as_str()) {
                return Err(TemplateError::UnknownVariant {
                    variant: name.clone(),
                    available: if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    },
                });
            }
        }
        Ok(self.variants.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> TemplateManifest {
        serde_yaml::from_str(
            r#"
id: minecraft-mod
name: Minecraft Mod
variables:
  - name: mod_name
    required: true
  - name: mod_id
    kind: identifier
    required: true
  - name: package
    kind: package
    default: com.example.mod
  - name: credits
derived:
  - name: main_class_name
    value: "{{mod_name}}Mod"
    transform: pascal
  - name: package_path
    value: "{{package}}"
    transform: path
  - name: refmap
    value: "{{mod_id}}.refmap.json"
variants:
  - name: fabric
    path: fabric
  - name: forge
    path: forge
  - name: neoforge
    path: neoforge
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_resolves_defaults_builtins_and_derived() {
        let manifest = manifest();
        let (ctx, selection) = ContextBuilder::new(&manifest)
            .variable("mod_name", "example mod")
            .variable("mod_id", "examplemod")
            .variants(["neoforge", "fabric"])
            .year(2025)
            .build()
            .unwrap();

        assert_eq!(ctx.get("package"), Some("com.example.mod"));
        assert_eq!(ctx.get("credits"), Some(""));
        assert_eq!(ctx.get("year"), Some("2025"));
        assert_eq!(ctx.get("template_id"), Some("minecraft-mod"));
        assert_eq!(ctx.get("selected_variants"), Some("fabric,neoforge"));
        assert_eq!(ctx.get("main_class_name"), Some("ExampleModMod"));
        assert_eq!(ctx.get("package_path"), Some("com/example/mod"));
        assert_eq!(ctx.get("refmap"), Some("examplemod.refmap.json"));
        assert!(selection.contains("fabric"));
        assert!(!selection.contains("forge"));
    }

    #[test]
    fn test_missing_required_variables_are_reported_together() {
        let manifest = manifest();
        let err = ContextBuilder::new(&manifest).build().unwrap_err();
        match err {
            TemplateError::MissingVariable(names) => assert_eq!(names, "mod_name, mod_id"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let manifest = manifest();
        let err = ContextBuilder::new(&manifest)
            .variable("mod_name", "Example")
            .variable("mod_id", "example-mod")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::InvalidVariable { ref variable, .. } if variable == "mod_id"
        ));
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let manifest = manifest();
        let err = ContextBuilder::new(&manifest)
            .variable("mod_name", "Example")
            .variable("mod_id", "example")
            .variant("quilt")
            .build()
            .unwrap_err();
        match err {
            TemplateError::UnknownVariant { variant, available } => {
                assert_eq!(variant, "quilt");
                assert_eq!(available, "fabric, forge, neoforge");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_and_derived_names_cannot_be_injected() {
        let manifest = manifest();
        let (ctx, selection) = ContextBuilder::new(&manifest)
            .variable("mod_name", "Example")
            .variable("mod_id", "example")
            .variable("main_class_name", "Hijacked")
            .variable("unrelated", "x")
            .build()
            .unwrap();
        assert_eq!(ctx.get("main_class_name"), Some("ExampleMod"));
        assert!(!ctx.contains("unrelated"));
        assert!(selection.is_empty());
        assert_eq!(ctx.get("selected_variants"), Some(""));
    }

    #[test]
    fn test_context_from_iter() {
        let ctx: SubstitutionContext = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
    }
}
