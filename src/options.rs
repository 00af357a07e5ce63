//! Compilation options
//!
//! Options are assembled by the caller before a compile and treated as
//! immutable by the pipeline. They can be built in code or loaded from TOML:
//!
//! ```toml
//! namespace = "Pages"
//! type_name = "Index"
//! filename = "index.html"
//! inherits = "Stencil.TemplateBase"
//! imports = ["Site.Helpers"]
//! warnings_as_errors = true
//! metadata = ["helpers.stnl"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::reference::{
    MetadataReference, Module, ReferenceSet, COLLECTIONS_MODULE, DEFAULT_BASE_TYPE, TEXT_MODULE,
};
use crate::type_name::TypeName;

pub const DEFAULT_NAMESPACE: &str = "TemplateNamespace";
pub const DEFAULT_TYPE_NAME: &str = "Template";

/// Errors that can occur when loading options from TOML
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("failed to read options file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to parse options TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("failed to read metadata reference {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings for one template compilation
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    namespace: String,
    type_name: String,
    filename: Option<String>,
    inherits: String,
    references: ReferenceSet,
    metadata_references: Vec<MetadataReference>,
    default_imports: Vec<String>,
    warnings_as_errors: bool,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            type_name: DEFAULT_TYPE_NAME.to_string(),
            filename: None,
            inherits: DEFAULT_BASE_TYPE.to_string(),
            references: ReferenceSet::standard(),
            metadata_references: Vec::new(),
            default_imports: vec![TEXT_MODULE.to_string(), COLLECTIONS_MODULE.to_string()],
            warnings_as_errors: false,
        }
    }
}

/// TOML structure for deserializing options
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlOptions {
    namespace: Option<String>,
    type_name: Option<String>,
    filename: Option<String>,
    inherits: Option<String>,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    warnings_as_errors: bool,
    #[serde(default)]
    metadata: Vec<PathBuf>,
}

impl CompilationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file. Metadata paths are resolved relative
    /// to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_with_base(&content, base)
    }

    /// Load options from a TOML string. Metadata paths are resolved relative
    /// to the working directory.
    pub fn from_toml_str(content: &str) -> Result<Self, OptionsError> {
        Self::from_toml_with_base(content, Path::new("."))
    }

    fn from_toml_with_base(content: &str, base: &Path) -> Result<Self, OptionsError> {
        let parsed: TomlOptions = toml::from_str(content)?;
        let mut options = Self::default();

        if let Some(namespace) = parsed.namespace {
            options = options.with_namespace(namespace);
        }
        if let Some(type_name) = parsed.type_name {
            options = options.with_type_name(type_name);
        }
        if let Some(filename) = parsed.filename {
            options = options.with_filename(filename);
        }
        if let Some(inherits) = parsed.inherits {
            options = options.with_inherits(inherits);
        }
        for import in parsed.imports {
            options = options.add_import(import);
        }
        for path in parsed.metadata {
            let full = base.join(&path);
            let reference = MetadataReference::from_file(&full)
                .map_err(|source| OptionsError::Metadata { path: full, source })?;
            options = options.add_metadata_reference(reference);
        }

        Ok(options.with_warnings_as_errors(parsed.warnings_as_errors))
    }

    /// Set the namespace of the generated type
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the name of the generated type
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Set the source file label. A blank label gets a random unit name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        self.filename = (!filename.trim().is_empty()).then_some(filename);
        self
    }

    /// Set the base type by its qualified name. An empty name keeps the
    /// current base type.
    pub fn with_inherits(mut self, inherits: impl Into<String>) -> Self {
        let inherits = inherits.into();
        if !inherits.trim().is_empty() {
            self.inherits = inherits;
        }
        self
    }

    /// Set the base type from a type descriptor
    pub fn with_base_type(self, base: &TypeName) -> Self {
        self.with_inherits(base.render(true))
    }

    /// Reference a native module. Adding the same module twice has no effect.
    pub fn add_module(mut self, module: Arc<Module>) -> Self {
        self.references.add(module);
        self
    }

    /// Reference a previously compiled artifact. Adding the same reference
    /// twice has no effect.
    pub fn add_metadata_reference(mut self, reference: MetadataReference) -> Self {
        if !self.metadata_references.iter().any(|r| r.ptr_eq(&reference)) {
            self.metadata_references.push(reference);
        }
        self
    }

    /// Add a default import. Imports keep insertion order without duplicates.
    pub fn add_import(mut self, import: impl Into<String>) -> Self {
        let import = import.into();
        if !self.default_imports.contains(&import) {
            self.default_imports.push(import);
        }
        self
    }

    /// Promote warnings to errors
    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn inherits(&self) -> &str {
        &self.inherits
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn metadata_references(&self) -> &[MetadataReference] {
        &self.metadata_references
    }

    pub fn default_imports(&self) -> &[String] {
        &self.default_imports
    }

    pub fn warnings_as_errors(&self) -> bool {
        self.warnings_as_errors
    }

    /// `<namespace>.<type name>`: the key the entry type is loaded by
    pub fn full_type_name(&self) -> String {
        TypeName::new(self.namespace.as_str(), self.type_name.as_str()).render(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::core_module;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = CompilationOptions::default();
        assert_eq!(options.full_type_name(), "TemplateNamespace.Template");
        assert_eq!(options.inherits(), "Stencil.TemplateBase");
        assert_eq!(
            options.default_imports(),
            &["Stencil.Text".to_string(), "Stencil.Collections".to_string()]
        );
        assert_eq!(options.filename(), None);
        assert_eq!(options.references().len(), 3);
    }

    #[test]
    fn test_builder_deduplicates() {
        let options = CompilationOptions::new()
            .add_import("Site")
            .add_import("Site")
            .add_module(core_module());
        assert_eq!(options.default_imports().len(), 3);
        assert_eq!(options.references().len(), 3);

        let reference = MetadataReference::from_bytes(vec![1, 2, 3]);
        let options = options
            .add_metadata_reference(reference.clone())
            .add_metadata_reference(reference);
        assert_eq!(options.metadata_references().len(), 1);
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let options = CompilationOptions::new().with_filename("  ").with_inherits("");
        assert_eq!(options.filename(), None);
        assert_eq!(options.inherits(), DEFAULT_BASE_TYPE);
    }

    #[test]
    fn test_base_type_from_descriptor() {
        let base = TypeName::generic("Site", "Page`1", [TypeName::new("Site", "User")]);
        let options = CompilationOptions::new().with_base_type(&base);
        assert_eq!(options.inherits(), "Site.Page<Site.User>");
    }

    #[test]
    fn test_from_toml_str() {
        let toml = r#"
namespace = "Pages"
type_name = "Index"
filename = "index.html"
imports = ["Site.Helpers"]
warnings_as_errors = true
"#;
        let options = CompilationOptions::from_toml_str(toml).expect("valid options");
        assert_eq!(options.full_type_name(), "Pages.Index");
        assert_eq!(options.filename(), Some("index.html"));
        assert!(options.warnings_as_errors());
        assert_eq!(options.default_imports().last().map(String::as_str), Some("Site.Helpers"));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = CompilationOptions::from_toml_str("colour = 1");
        assert!(matches!(result, Err(OptionsError::ParseError(_))));
    }

    #[test]
    fn test_missing_metadata_file() {
        let result = CompilationOptions::from_toml_str(r#"metadata = ["does/not/exist.stnl"]"#);
        assert!(matches!(result, Err(OptionsError::Metadata { .. })));
    }
}
