//! Type descriptors and their source-level rendering
//!
//! A [`TypeName`] describes a (possibly nested, possibly generic) type the way
//! the reference registry knows it. Rendering turns it into a name that can be
//! written back into program text, e.g. as the target of an `inherits`
//! directive or as the key used to look up an artifact's entry type.

use std::fmt;

/// Marker separating a generic type's raw name from its arity (`List`1`)
const ARITY_MARKER: char = '`';

/// A static type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    namespace: Option<String>,
    name: String,
    declaring: Option<Box<TypeName>>,
    generic_args: Vec<TypeName>,
}

impl TypeName {
    /// A plain type in `namespace`. An empty namespace means "no namespace".
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            name: name.into(),
            declaring: None,
            generic_args: Vec::new(),
        }
    }

    /// A generic type. `name` may carry an arity marker (`Model`1`), which is
    /// stripped during rendering.
    pub fn generic(
        namespace: impl Into<String>,
        name: impl Into<String>,
        args: impl IntoIterator<Item = TypeName>,
    ) -> Self {
        Self::new(namespace, name).with_generic_args(args)
    }

    /// A type declared inside `declaring`. The nested type shares the
    /// namespace of its outermost declaring type.
    pub fn nested(declaring: TypeName, name: impl Into<String>) -> Self {
        Self {
            namespace: declaring.namespace.clone(),
            name: name.into(),
            declaring: Some(Box::new(declaring)),
            generic_args: Vec::new(),
        }
    }

    pub fn with_generic_args(mut self, args: impl IntoIterator<Item = TypeName>) -> Self {
        self.generic_args = args.into_iter().collect();
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The raw name, including any arity marker
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> Option<&TypeName> {
        self.declaring.as_deref()
    }

    pub fn generic_args(&self) -> &[TypeName] {
        &self.generic_args
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Render the type as a source-level reference.
    ///
    /// The enclosing chain of a nested type is rendered without namespace;
    /// the namespace is only prepended at the outermost call. Generic
    /// arguments are always rendered fully qualified.
    ///
    /// ```rust
    /// use stencil::TypeName;
    ///
    /// let int = TypeName::new("System", "Int32");
    /// let model = TypeName::generic("Program", "Model`1", [int]);
    /// assert_eq!(model.render(true), "Program.Model<System.Int32>");
    /// assert_eq!(model.render(false), "Model<System.Int32>");
    /// ```
    pub fn render(&self, include_namespace: bool) -> String {
        let mut name = String::new();

        if include_namespace {
            if let Some(ns) = &self.namespace {
                name.push_str(ns);
                name.push('.');
            }
        }

        if let Some(declaring) = &self.declaring {
            name.push_str(&declaring.render(false));
            name.push('.');
        }

        if !self.is_generic() {
            name.push_str(&self.name);
            return name;
        }

        let bare = match self.name.find(ARITY_MARKER) {
            Some(idx) => &self.name[..idx],
            None => self.name.as_str(),
        };
        name.push_str(bare);

        let args = self
            .generic_args
            .iter()
            .map(|arg| arg.render(true))
            .collect::<Vec<_>>()
            .join(", ");
        name.push('<');
        name.push_str(&args);
        name.push('>');

        name
    }

    /// Shorthand for `render(true)`
    pub fn full_name(&self) -> String {
        self.render(true)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}
