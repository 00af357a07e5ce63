//! Stencil - a Razor-style template engine
//!
//! Templates are markup with `@` transitions into a small host language. A
//! template is turned into program text, compiled into a binary artifact and
//! executed against a dynamic model:
//!
//! 1. the directive injector prepends `@inherits` and `@using` lines derived
//!    from the [`CompilationOptions`],
//! 2. the program generator emits one template type whose `execute` body
//!    replays the template against the base contract,
//! 3. the compiler resolves that program against the reference set and
//!    encodes it into a [`CompiledArtifact`],
//! 4. the artifact is run with a model in a fresh [`TemplateInstance`].
//!
//! # Example
//!
//! ```rust
//! use stencil::{record, render};
//!
//! let html = render("Hello @Model.Name", record! { Name: "Alex" }).unwrap();
//! assert_eq!(html, "Hello Alex");
//! ```

pub mod artifact;
pub mod codegen;
pub mod compiler;
pub mod directives;
pub mod error;
pub mod options;
pub mod program;
pub mod reference;
pub mod runtime;
pub mod template;
pub mod type_name;
pub mod value;

pub use artifact::CompiledArtifact;
pub use compiler::compile;
pub use error::{CompileError, Diagnostic, LoadError, Origin, RenderError, Severity};
pub use options::{CompilationOptions, OptionsError};
pub use reference::{BaseType, MetadataReference, Module, NativeFunction, ReferenceSet};
pub use runtime::TemplateInstance;
pub use type_name::TypeName;
pub use value::{to_value, StructuralValue, Value};

use thiserror::Error;

/// Errors from the complete template pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    /// A JSON model that could not be parsed
    #[error("invalid model: {0}")]
    Model(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background compile task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Directive-injected template text and the program generated from it
fn generate(template: &str, options: &CompilationOptions) -> Result<(String, String), CompileError> {
    let injected = directives::inject(template, options);
    match codegen::generate(&injected, options) {
        Ok(program) => Ok((injected, program)),
        Err(diagnostic) => Err(CompileError {
            diagnostics: vec![diagnostic],
            generated_code: String::new(),
            template: injected,
        }),
    }
}

/// Generate the program text for `template` without compiling it
pub fn generate_program(template: &str, options: &CompilationOptions) -> Result<String, CompileError> {
    generate(template, options).map(|(_, program)| program)
}

/// Compile template text into an artifact
pub fn compile_template(
    template: &str,
    options: &CompilationOptions,
) -> Result<CompiledArtifact, CompileError> {
    let (injected, program) = generate(template, options)?;
    compiler::compile(&program, options).map_err(|mut err| {
        err.template = injected;
        err
    })
}

/// Compile on the blocking thread pool
pub async fn compile_async(
    template: String,
    options: CompilationOptions,
) -> Result<CompiledArtifact, Error> {
    let artifact =
        tokio::task::spawn_blocking(move || compile_template(&template, &options)).await??;
    Ok(artifact)
}

/// Compile `template` with default options and render it with `model`
pub fn render(template: &str, model: impl Into<Value>) -> Result<String, Error> {
    render_with(template, model, &CompilationOptions::default())
}

/// Compile `template` with `options` and render it with `model`
pub fn render_with(
    template: &str,
    model: impl Into<Value>,
    options: &CompilationOptions,
) -> Result<String, Error> {
    let artifact = compile_template(template, options)?;
    Ok(artifact.run(model)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_template() {
        let html = render("Hello @Model.Name", crate::record! { Name: "Alex" }).expect("renders");
        assert_eq!(html, "Hello Alex");
    }

    #[test]
    fn test_null_model_renders_empty() {
        assert_eq!(render("Name: @Model", Value::Null).expect("renders"), "Name: ");
    }

    #[test]
    fn test_template_errors_point_at_template() {
        let err = compile_template("@(Model.Name", &CompilationOptions::default())
            .expect_err("unterminated");
        assert!(err.generated_code.is_empty());
        assert_eq!(err.errors().next().map(|d| d.origin), Some(Origin::Template));
        assert!(err.template.starts_with("@inherits Stencil.TemplateBase"));
    }

    #[test]
    fn test_program_errors_keep_both_texts() {
        let err = compile_template("@(Missing)", &CompilationOptions::default())
            .expect_err("unknown name");
        assert!(err.generated_code.contains("Write(Missing);"));
        assert!(err.template.ends_with("@(Missing)"));
        assert!(matches!(Error::from(err), Error::Compile(_)));
    }

    #[test]
    fn test_malformed_json_model() {
        let err: Error = Value::from_json_str("{\"Name\": ")
            .map_err(Error::from)
            .expect_err("truncated json");
        assert!(matches!(err, Error::Model(_)));
        assert!(err.to_string().starts_with("invalid model: "));
    }
}
