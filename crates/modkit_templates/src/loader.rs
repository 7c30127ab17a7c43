//! Template loading functionality.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::TemplateManifest;

const MANIFEST_FILES: [&str; 2] = ["template.yaml", "template.yml"];
const CONTENT_DIR: &str = "template";

/// A loaded and validated template.
#[derive(Debug, Clone)]
pub struct Template {
    pub manifest: TemplateManifest,
    /// Directory holding the manifest.
    pub root: PathBuf,
    /// Directory whose contents are instantiated.
    pub content_root: PathBuf,
    /// Manifest path relative to the content root, when the two overlap.
    embedded_manifest: Option<PathBuf>,
    ignore: Vec<Pattern>,
    verbatim: Vec<Pattern>,
}

impl Template {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Whether a path relative to the content root is excluded from output.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.embedded_manifest.as_deref() == Some(relative)
            || self.ignore.iter().any(|p| p.matches_path(relative))
    }

    /// Whether a file's contents are copied without substitution.
    pub fn is_verbatim(&self, relative: &Path) -> bool {
        self.verbatim.iter().any(|p| p.matches_path(relative))
    }
}

/// Template loader.
pub struct TemplateLoader {
    templates_path: PathBuf,
}

impl TemplateLoader {
    /// Create a new template loader.
    pub fn new(templates_path: impl Into<PathBuf>) -> Self {
        Self {
            templates_path: templates_path.into(),
        }
    }

    pub fn templates_path(&self) -> &Path {
        &self.templates_path
    }

    /// Subdirectories of the templates directory, sorted by name.
    pub fn template_dirs(&self) -> Vec<PathBuf> {
        if !self.templates_path.exists() {
            warn!("Templates directory does not exist: {:?}", self.templates_path);
            return Vec::new();
        }

        WalkDir::new(&self.templates_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.into_path())
            .collect()
    }

    /// Load all templates from the templates directory.
    ///
    /// Templates that fail to load are logged and skipped.
    pub fn load_all(&self) -> TemplateResult<TemplateRegistry> {
        let mut registry = TemplateRegistry::default();

        for path in self.template_dirs() {
            match self.load_template(&path) {
                Ok(template) => {
                    info!("Loaded template: {} ({})", template.manifest.name, template.id());
                    registry.register(template);
                }
                Err(e) => {
                    warn!("Failed to load template from {:?}: {}", path, e);
                }
            }
        }

        Ok(registry)
    }

    /// Load and validate a single template from a directory.
    pub fn load_template(&self, path: &Path) -> TemplateResult<Template> {
        let manifest_path = MANIFEST_FILES
            .iter()
            .map(|name| path.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                TemplateError::NotFound(format!("No template.yaml found in {:?}", path))
            })?;

        let manifest = self.load_manifest(&manifest_path, path)?;

        let content_dir = path.join(CONTENT_DIR);
        let (content_root, embedded_manifest) = if content_dir.is_dir() {
            (content_dir, None)
        } else {
            let name = manifest_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_default();
            (path.to_path_buf(), Some(name))
        };

        manifest.validate(&content_root)?;

        let compile = |globs: &[String]| -> TemplateResult<Vec<Pattern>> {
            globs
                .iter()
                .map(|g| {
                    Pattern::new(g).map_err(|e| TemplateError::InvalidManifest {
                        template: manifest.id.clone(),
                        message: format!("Invalid glob '{}': {}", g, e),
                    })
                })
                .collect()
        };
        let ignore = compile(&manifest.ignore)?;
        let verbatim = compile(&manifest.verbatim)?;

        Ok(Template {
            manifest,
            root: path.to_path_buf(),
            content_root,
            embedded_manifest,
            ignore,
            verbatim,
        })
    }

    /// Load a manifest file.
    fn load_manifest(&self, path: &Path, template_dir: &Path) -> TemplateResult<TemplateManifest> {
        debug!("Loading manifest from {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| TemplateError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| TemplateError::InvalidManifest {
            template: template_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| template_dir.display().to_string()),
            message: e.to_string(),
        })
    }
}

/// Registry of available templates, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    /// Register a template. A second template with the same id is rejected.
    pub fn register(&mut self, template: Template) -> bool {
        if self.templates.contains_key(template.id()) {
            warn!(
                "Duplicate template id '{}' at {:?}, keeping the first one",
                template.id(),
                template.root
            );
            return false;
        }
        self.templates.insert(template.id().to_string(), template);
        true
    }

    /// Get a template by ID.
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Check if a template exists.
    pub fn exists(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// List all registered templates.
    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_loader_empty_dir() {
        let temp = tempdir().unwrap();
        let loader = TemplateLoader::new(temp.path());
        let registry = loader.load_all().unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_load_template_with_content_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("basic");
        write(
            &dir.join("template.yaml"),
            "id: basic\nname: Basic\nignore: [\"**/*.bak\"]\nverbatim: [\"**/*.png\"]\n",
        );
        write(&dir.join("template/README.md"), "# {{template_id}}\n");

        let template = TemplateLoader::new(temp.path()).load_template(&dir).unwrap();
        assert_eq!(template.id(), "basic");
        assert_eq!(template.content_root, dir.join("template"));
        assert!(template.is_ignored(Path::new("src/old.bak")));
        assert!(!template.is_ignored(Path::new("README.md")));
        assert!(template.is_verbatim(Path::new("assets/icon.png")));
    }

    #[test]
    fn test_manifest_in_content_root_is_ignored() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("flat");
        write(&dir.join("template.yml"), "id: flat\nname: Flat\n");
        write(&dir.join("file.txt"), "hello");

        let template = TemplateLoader::new(temp.path()).load_template(&dir).unwrap();
        assert_eq!(template.content_root, dir);
        assert!(template.is_ignored(Path::new("template.yml")));
        assert!(!template.is_ignored(Path::new("file.txt")));
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("broken");
        write(
            &dir.join("template.yaml"),
            "id: broken\nname: Broken\nvariants:\n  - name: fabric\n    path: fabric\n",
        );
        fs::create_dir_all(dir.join("template")).unwrap();

        let err = TemplateLoader::new(temp.path()).load_template(&dir).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidManifest { .. }));

        write(&dir.join("template.yaml"), "id: [unterminated\n");
        let err = TemplateLoader::new(temp.path()).load_template(&dir).unwrap_err();
        match err {
            TemplateError::InvalidManifest { template, .. } => assert_eq!(template, "broken"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_load_all_skips_broken_templates() {
        let temp = tempdir().unwrap();
        write(&temp.path().join("good/template.yaml"), "id: good\nname: Good\n");
        write(&temp.path().join("bad/template.yaml"), "name: missing id\n");
        fs::create_dir_all(temp.path().join("empty")).unwrap();

        let registry = TemplateLoader::new(temp.path()).load_all().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.exists("good"));
    }
}
