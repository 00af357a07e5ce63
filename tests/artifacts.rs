//! Artifact persistence, loading and async pipeline tests

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::{tempdir, NamedTempFile};

use stencil::{
    compile_async, compile_template, record, CompilationOptions, CompiledArtifact, LoadError,
    ReferenceSet, Value,
};

const TEMPLATE: &str = "<ul>@foreach(var item in Model.Items) { <li>@item</li> }</ul>";

fn model() -> Value {
    record! { Items: vec!["one", "two"] }
}

#[test]
fn test_save_and_load_round_trip() {
    let options = CompilationOptions::default().with_filename("list.html");
    let artifact = compile_template(TEMPLATE, &options).expect("compiles");
    let expected = artifact.run(model()).expect("renders");
    assert_eq!(expected, "<ul><li>one</li><li>two</li></ul>");

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("list.stnl");
    artifact.save_to_file(&path).expect("saves");

    let loaded =
        CompiledArtifact::load_from_file(&path, &options.full_type_name()).expect("loads");
    assert_eq!(loaded.payload(), artifact.payload());
    assert_eq!(loaded.unit_name(), "list.html");
    assert_eq!(loaded.run(model()).expect("renders"), expected);
}

#[test]
fn test_writer_and_reader_round_trip() {
    let artifact = compile_template("Hi @Model.Name", &CompilationOptions::default())
        .expect("compiles");
    let mut buffer = Vec::new();
    artifact.save_to_writer(&mut buffer).expect("writes");

    let loaded = CompiledArtifact::load_from_reader(
        buffer.as_slice(),
        "TemplateNamespace.Template",
        &ReferenceSet::standard(),
    )
    .expect("reads");
    assert_eq!(
        loaded.run(record! { Name: "Alex" }).expect("renders"),
        "Hi Alex"
    );
}

#[test]
fn test_load_with_wrong_type_name() {
    let artifact = compile_template("x", &CompilationOptions::default()).expect("compiles");
    let err = CompiledArtifact::load(artifact.payload().to_vec(), "Other.Template")
        .expect_err("wrong type");
    assert!(matches!(err, LoadError::TypeNotFound { ref type_name, .. } if type_name == "Other.Template"));
}

#[test]
fn test_load_rejects_garbage() {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(b"definitely not an artifact").expect("writes");
    let err = CompiledArtifact::load_from_file(file.path(), "TemplateNamespace.Template")
        .expect_err("garbage");
    assert!(matches!(err, LoadError::InvalidArtifact { .. }));

    let err = CompiledArtifact::load_from_file("does/not/exist.stnl", "A.B").expect_err("missing");
    assert!(matches!(err, LoadError::Io(_)));
}

#[test]
fn test_options_file_with_metadata() {
    let dir = tempdir().expect("temp dir");

    let library_options = CompilationOptions::default()
        .with_namespace("Site")
        .with_type_name("Format");
    let library = stencil::compile(
        "namespace Site; static class Format { fn Money(x) { return \"$\" + x; } }",
        &library_options,
    )
    .expect("library compiles");
    library
        .save_to_file(dir.path().join("format.stnl"))
        .expect("saves");

    let config = dir.path().join("stencil.toml");
    std::fs::write(
        &config,
        "namespace = \"Pages\"\ntype_name = \"Price\"\nimports = [\"Site\"]\nmetadata = [\"format.stnl\"]\n",
    )
    .expect("writes config");

    let options = CompilationOptions::from_file(&config).expect("loads options");
    let artifact = compile_template("@Format.Money(Model.Amount)", &options).expect("compiles");
    assert_eq!(artifact.type_name(), "Pages.Price");
    assert_eq!(
        artifact.run(record! { Amount: 5 }).expect("renders"),
        "$5"
    );
}

#[tokio::test]
async fn test_async_pipeline() {
    let options = CompilationOptions::default();
    let artifact = compile_async(TEMPLATE.to_string(), options.clone())
        .await
        .expect("compiles");
    let html = artifact.run_async(model()).await.expect("renders");
    assert_eq!(html, "<ul><li>one</li><li>two</li></ul>");

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("async.stnl");
    artifact.save_to_file_async(&path).await.expect("saves");
    let loaded = CompiledArtifact::load_from_file_async(
        &path,
        &options.full_type_name(),
        options.references(),
    )
    .await
    .expect("loads");
    assert_eq!(loaded.run_async(model()).await.expect("renders"), html);
}
