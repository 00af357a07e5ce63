//! Backend compiler adapter
//!
//! Compiles program text into a [`CompiledArtifact`]: parse, link the library
//! types of metadata references, resolve every name against the reference
//! set, then encode the unit image and bind its entry type.

mod resolve;

use indexmap::IndexSet;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::artifact::{self, CompiledArtifact};
use crate::error::{CompileError, Diagnostic, Origin, Severity};
use crate::options::CompilationOptions;
use crate::program::ir::{TypeImage, TypeKind, UnitImage};
use crate::program::parse;

use resolve::{resolve, Environment};

/// Length of generated unit names
const RANDOM_NAME_LEN: usize = 12;

/// Compile program text into a loaded artifact.
///
/// Fails when any diagnostic is an error or a warning promoted to one; the
/// error carries every diagnostic together with `program`.
pub fn compile(
    program: &str,
    options: &CompilationOptions,
) -> Result<CompiledArtifact, CompileError> {
    let failure = |diagnostics: Vec<Diagnostic>| CompileError {
        diagnostics,
        generated_code: program.to_string(),
        template: String::new(),
    };

    let unit = parse(program).map_err(failure)?;

    let mut diagnostics = Vec::new();
    let mut modules = IndexSet::new();
    let mut linked: Vec<TypeImage> = Vec::new();
    for (index, reference) in options.metadata_references().iter().enumerate() {
        match artifact::decode_unit(reference.bytes()) {
            Ok(image) => {
                modules.extend(image.modules);
                for ty in image.types {
                    let duplicate = linked.iter().any(|t| t.full_name == ty.full_name);
                    if ty.kind == TypeKind::Library && !duplicate {
                        linked.push(ty);
                    }
                }
            }
            Err(err) => diagnostics.push(Diagnostic::error(
                Origin::Program,
                0..0,
                format!("metadata reference #{index} could not be read: {err}"),
            )),
        }
    }

    let metadata = options.references().metadata();
    let env = Environment {
        modules: &metadata,
        linked: &linked,
        warnings_as_errors: options.warnings_as_errors(),
    };
    let resolution = resolve(&unit, &env);
    diagnostics.extend(resolution.diagnostics);

    let type_name = options.full_type_name();
    if !resolution.types.iter().any(|t| t.full_name == type_name) {
        diagnostics.push(Diagnostic::error(
            Origin::Program,
            0..0,
            format!("the program does not define the type '{type_name}'"),
        ));
    }

    if diagnostics.iter().any(Diagnostic::is_error) {
        return Err(failure(diagnostics));
    }
    for diagnostic in diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
    {
        tracing::warn!(%diagnostic, "compile warning");
    }

    modules.extend(resolution.modules);
    let image = UnitImage {
        name: unit_name(options),
        modules: modules.into_iter().collect(),
        types: resolution.types,
    };

    let payload = artifact::encode_unit(&image).map_err(|err| {
        failure(vec![Diagnostic::error(
            Origin::Program,
            0..0,
            format!("failed to encode artifact: {err}"),
        )])
    })?;
    let size = payload.len();
    let unit_name = image.name.clone();

    let compiled = CompiledArtifact::bind(payload, image, &type_name, options.references())
        .map_err(|err| failure(vec![Diagnostic::error(Origin::Program, 0..0, err.to_string())]))?;

    tracing::debug!(unit = %unit_name, type_name = %type_name, bytes = size, "compiled template program");
    Ok(compiled)
}

/// The source file label, or a random name when none is set
fn unit_name(options: &CompilationOptions) -> String {
    match options.filename() {
        Some(filename) => filename.to_string(),
        None => rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_NAME_LEN)
            .map(char::from)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    const GREETING: &str = r#"
namespace TestAssembly;

static class Greeting
{
    fn GetGreeting(name) { return "Hello, " + name + "!"; }
}
"#;

    fn template(body: &str) -> String {
        format!(
            "namespace TemplateNamespace;\nusing Stencil.Text;\nclass Template : Stencil.TemplateBase\n{{\n    execute\n    {{\n{body}\n    }}\n}}\n"
        )
    }

    #[test]
    fn test_compile_and_run() {
        let program = template("WriteLiteral(\"Hello \"); Write(Model.Name);");
        let artifact = compile(&program, &CompilationOptions::default()).expect("compiles");
        let model = crate::record! { Name: "<Alex>" };
        assert_eq!(artifact.run(model).expect("runs"), "Hello &lt;Alex&gt;");
    }

    #[test]
    fn test_unit_name_follows_filename() {
        let program = template("");
        let named = compile(&program, &CompilationOptions::default().with_filename("page.html"))
            .expect("compiles");
        assert_eq!(named.unit_name(), "page.html");

        let random = compile(&program, &CompilationOptions::default()).expect("compiles");
        assert_eq!(random.unit_name().len(), RANDOM_NAME_LEN);
        assert!(random.unit_name().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_errors_carry_generated_code() {
        let program = template("Write(missing);");
        let err = compile(&program, &CompilationOptions::default()).expect_err("fails");
        assert_eq!(err.generated_code, program);
        assert_eq!(err.errors().count(), 1);
    }

    #[test]
    fn test_syntax_errors_fail() {
        let err = compile("class {", &CompilationOptions::default()).expect_err("fails");
        assert!(err.errors().count() >= 1);
    }

    #[test]
    fn test_entry_type_must_exist() {
        let program = template("").replace("class Template", "class Other");
        let err = compile(&program, &CompilationOptions::default()).expect_err("fails");
        assert!(err.errors().any(|d| d.message.contains("TemplateNamespace.Template")));
    }

    #[test]
    fn test_warnings_as_errors() {
        let program = template("").replace("using Stencil.Text;", "using Stencil.Text;\nusing Nowhere;");
        assert!(compile(&program, &CompilationOptions::default()).is_ok());
        let strict = CompilationOptions::default().with_warnings_as_errors(true);
        let err = compile(&program, &strict).expect_err("warning promoted");
        assert_eq!(err.errors().next().map(|d| d.severity), Some(Severity::WarningAsError));
    }

    #[test]
    fn test_metadata_reference_links_library() {
        let library_options = CompilationOptions::default()
            .with_namespace("TestAssembly")
            .with_type_name("Greeting");
        let library = compile(GREETING, &library_options).expect("library compiles");

        let options = CompilationOptions::default().add_metadata_reference(library.to_metadata_reference());
        let program = template("Write(TestAssembly.Greeting.GetGreeting(\"Name\"));");
        let artifact = compile(&program, &options).expect("compiles against the library");
        assert_eq!(artifact.run(Value::Null).expect("runs"), "Hello, Name!");
    }

    #[test]
    fn test_unreadable_metadata_reference() {
        let options = CompilationOptions::default()
            .add_metadata_reference(crate::reference::MetadataReference::from_bytes(vec![0u8; 3]));
        let err = compile(&template(""), &options).expect_err("fails");
        assert!(err.errors().any(|d| d.message.contains("could not be read")));
    }
}
