//! Reference registry for native modules and template base types
//!
//! A program can only call what its [`ReferenceSet`] provides. The compiler
//! sees modules as metadata (names and arities); the loader binds the same
//! modules again to obtain the callable functions.

mod standard;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::type_name::TypeName;
use crate::value::Value;

pub use standard::{
    collections_module, core_module, text_module, COLLECTIONS_MODULE, CORE_MODULE,
    DEFAULT_BASE_TYPE, TEXT_MODULE,
};

/// Signature of a native function
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync>;

/// A named native function with an optional fixed arity
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    arity: Option<usize>,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        func: impl Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: Some(arity),
            func: Arc::new(func),
        }
    }

    /// A function accepting any number of arguments
    pub fn variadic(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: None,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(RenderError::native(
                    &self.name,
                    format!("expected {} argument(s), got {}", arity, args.len()),
                ));
            }
        }
        (self.func)(args)
    }

    pub fn metadata(&self) -> FunctionMetadata {
        FunctionMetadata {
            name: self.name.clone(),
            arity: self.arity,
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A template base type: the contract a generated template type inherits.
///
/// Properties are instance slots visible to templates as bare names; they
/// start out null and are set by the caller before execution. Methods are
/// native functions callable unqualified from the template body.
#[derive(Debug, Clone)]
pub struct BaseType {
    name: TypeName,
    properties: Vec<String>,
    methods: IndexMap<String, NativeFunction>,
}

impl BaseType {
    pub fn new(name: TypeName) -> Self {
        Self {
            name,
            properties: Vec::new(),
            methods: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    pub fn with_method(mut self, method: NativeFunction) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn full_name(&self) -> String {
        self.name.render(true)
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    pub fn method(&self, name: &str) -> Option<&NativeFunction> {
        self.methods.get(name)
    }

    pub fn metadata(&self) -> BaseTypeMetadata {
        BaseTypeMetadata {
            full_name: self.full_name(),
            properties: self.properties.clone(),
            methods: self.methods.values().map(NativeFunction::metadata).collect(),
        }
    }
}

/// A named library of native functions and base types
#[derive(Debug)]
pub struct Module {
    name: String,
    functions: IndexMap<String, NativeFunction>,
    base_types: Vec<BaseType>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            base_types: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: NativeFunction) -> Self {
        self.functions.insert(function.name.clone(), function);
        self
    }

    pub fn with_base_type(mut self, base: BaseType) -> Self {
        self.base_types.push(base);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &NativeFunction> {
        self.functions.values()
    }

    pub fn base_type(&self, full_name: &str) -> Option<&BaseType> {
        self.base_types.iter().find(|b| b.full_name() == full_name)
    }

    pub fn base_types(&self) -> &[BaseType] {
        &self.base_types
    }

    /// Symbol table seen by the compiler
    pub fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            name: self.name.clone(),
            functions: self.functions.values().map(NativeFunction::metadata).collect(),
            base_types: self.base_types.iter().map(BaseType::metadata).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub name: String,
    /// `None` for variadic functions
    pub arity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTypeMetadata {
    pub full_name: String,
    pub properties: Vec<String>,
    pub methods: Vec<FunctionMetadata>,
}

impl BaseTypeMetadata {
    pub fn method(&self, name: &str) -> Option<&FunctionMetadata> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub name: String,
    pub functions: Vec<FunctionMetadata>,
    pub base_types: Vec<BaseTypeMetadata>,
}

impl ModuleMetadata {
    pub fn function(&self, name: &str) -> Option<&FunctionMetadata> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Modules available to a compilation, deduplicated by identity
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    modules: Vec<Arc<Module>>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard modules: `Stencil`, `Stencil.Text` and `Stencil.Collections`
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.add(core_module());
        set.add(text_module());
        set.add(collections_module());
        set
    }

    /// Add a module. Returns `false` if this exact module is already present.
    pub fn add(&mut self, module: Arc<Module>) -> bool {
        if self.contains(&module) {
            return false;
        }
        self.modules.push(module);
        true
    }

    pub fn extend(&mut self, other: &ReferenceSet) {
        for module in &other.modules {
            self.add(Arc::clone(module));
        }
    }

    pub fn contains(&self, module: &Arc<Module>) -> bool {
        self.modules.iter().any(|m| Arc::ptr_eq(m, module))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// First module registered under `name`
    pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Find a base type by its rendered full name
    pub fn base_type(&self, full_name: &str) -> Option<(&Arc<Module>, &BaseType)> {
        self.modules
            .iter()
            .find_map(|m| m.base_type(full_name).map(|b| (m, b)))
    }

    pub fn metadata(&self) -> Vec<ModuleMetadata> {
        self.modules.iter().map(|m| m.metadata()).collect()
    }
}

/// A previously compiled artifact whose library types are linked into new
/// compilations
#[derive(Clone)]
pub struct MetadataReference {
    bytes: Arc<[u8]>,
}

impl MetadataReference {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn ptr_eq(&self, other: &MetadataReference) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for MetadataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataReference")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting_module() -> Arc<Module> {
        Arc::new(
            Module::new("Greeting").with_function(NativeFunction::new("Hello", 1, |args| {
                Ok(Value::from(format!("Hello, {}!", args[0])))
            })),
        )
    }

    #[test]
    fn test_reference_set_deduplicates_by_identity() {
        let mut set = ReferenceSet::new();
        let module = greeting_module();

        assert!(set.add(Arc::clone(&module)));
        assert!(!set.add(Arc::clone(&module)));
        // Same name, different module
        assert!(set.add(greeting_module()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_standard_set_provides_default_base_type() {
        let set = ReferenceSet::standard();
        let (module, base) = set.base_type(DEFAULT_BASE_TYPE).expect("standard base type");
        assert_eq!(module.name(), CORE_MODULE);
        assert!(base.properties().is_empty());
        assert!(set.module(TEXT_MODULE).is_some());
        assert!(set.module(COLLECTIONS_MODULE).is_some());
    }

    #[test]
    fn test_standard_modules_are_shared() {
        let a = ReferenceSet::standard();
        let b = ReferenceSet::standard();
        let mut merged = a.clone();
        merged.extend(&b);
        assert_eq!(merged.len(), a.len());
    }

    #[test]
    fn test_native_arity_is_checked() {
        let module = greeting_module();
        let hello = module.function("Hello").expect("function exists");
        assert_eq!(
            hello.call(&[Value::from("Alex")]).expect("call succeeds"),
            Value::from("Hello, Alex!")
        );
        assert!(matches!(hello.call(&[]), Err(RenderError::Native { .. })));
    }

    #[test]
    fn test_module_metadata() {
        let base = BaseType::new(TypeName::new("Tests", "CustomBase"))
            .with_property("A")
            .with_method(NativeFunction::variadic("Decorate", |_| Ok(Value::Null)));
        let module = Module::new("Tests").with_base_type(base);
        let meta = module.metadata();

        assert_eq!(meta.base_types[0].full_name, "Tests.CustomBase");
        assert_eq!(meta.base_types[0].properties, vec!["A".to_string()]);
        assert_eq!(meta.base_types[0].method("Decorate").map(|m| m.arity), Some(None));
    }
}
