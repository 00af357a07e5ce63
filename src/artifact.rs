//! Compiled artifacts and the artifact loader
//!
//! An artifact payload is the magic `STNL`, a little-endian `u16` format
//! version and the postcard-encoded [`UnitImage`]. Loading decodes the image,
//! binds the native modules it requires from a [`ReferenceSet`] and resolves
//! the entry type by its full name. The payload is kept byte for byte, so
//! saving and reloading an artifact never changes what it renders.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{LoadError, RenderError};
use crate::program::ir::{TypeImage, TypeKind, UnitImage};
use crate::reference::{BaseType, MetadataReference, Module, ReferenceSet};
use crate::runtime::TemplateInstance;
use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"STNL";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

pub(crate) fn encode_unit(unit: &UnitImage) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(unit)?;
    let mut payload = Vec::with_capacity(HEADER_LEN + body.len());
    payload.extend_from_slice(MAGIC);
    payload.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    payload.extend_from_slice(&body);
    Ok(payload)
}

pub(crate) fn decode_unit(payload: &[u8]) -> Result<UnitImage, LoadError> {
    let rest = payload
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| LoadError::invalid("missing STNL header"))?;
    let (version, body) = match rest {
        [lo, hi, body @ ..] => (u16::from_le_bytes([*lo, *hi]), body),
        _ => return Err(LoadError::invalid("truncated header")),
    };
    if version != FORMAT_VERSION {
        return Err(LoadError::invalid(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }
    postcard::from_bytes(body).map_err(|err| LoadError::invalid(err.to_string()))
}

/// A loaded unit with its entry type resolved and its modules bound
#[derive(Debug)]
pub struct EntryType {
    unit: UnitImage,
    type_index: usize,
    modules: IndexMap<String, Arc<Module>>,
    base: Option<BaseType>,
}

impl EntryType {
    fn bind(unit: UnitImage, type_name: &str, references: &ReferenceSet) -> Result<Self, LoadError> {
        let Some((type_index, ty)) = unit.find_type(type_name) else {
            return Err(LoadError::TypeNotFound {
                type_name: type_name.to_string(),
                module: unit.name.clone(),
            });
        };

        let mut modules = IndexMap::new();
        for name in &unit.modules {
            let module = references
                .module(name)
                .ok_or_else(|| LoadError::MissingReference { name: name.clone() })?;
            modules.insert(name.clone(), Arc::clone(module));
        }

        let base = match &ty.base {
            Some(base) => {
                let bound = modules
                    .get(&base.module)
                    .and_then(|m| m.base_type(&base.full_name))
                    .ok_or_else(|| LoadError::MissingReference {
                        name: base.full_name.clone(),
                    })?;
                Some(bound.clone())
            }
            None => None,
        };

        Ok(Self {
            unit,
            type_index,
            modules,
            base,
        })
    }

    pub fn unit(&self) -> &UnitImage {
        &self.unit
    }

    pub fn image(&self) -> &TypeImage {
        &self.unit.types[self.type_index]
    }

    pub fn type_index(&self) -> usize {
        self.type_index
    }

    pub fn type_name(&self) -> &str {
        &self.image().full_name
    }

    /// Only template types have an instance to allocate
    pub fn is_instantiable(&self) -> bool {
        let image = self.image();
        image.kind == TypeKind::Template && image.execute.is_some()
    }

    pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    pub fn base(&self) -> Option<&BaseType> {
        self.base.as_ref()
    }
}

/// The compiled, loadable form of a template or library program
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    payload: Arc<[u8]>,
    entry: Arc<EntryType>,
}

impl CompiledArtifact {
    pub(crate) fn bind(
        payload: Vec<u8>,
        unit: UnitImage,
        type_name: &str,
        references: &ReferenceSet,
    ) -> Result<Self, LoadError> {
        let entry = EntryType::bind(unit, type_name, references)?;
        Ok(Self {
            payload: payload.into(),
            entry: Arc::new(entry),
        })
    }

    /// Load a payload against the standard reference set
    pub fn load(payload: impl Into<Vec<u8>>, type_name: &str) -> Result<Self, LoadError> {
        Self::load_with(payload, type_name, &ReferenceSet::standard())
    }

    /// Load a payload, binding its modules from `references`
    pub fn load_with(
        payload: impl Into<Vec<u8>>,
        type_name: &str,
        references: &ReferenceSet,
    ) -> Result<Self, LoadError> {
        let payload = payload.into();
        let unit = decode_unit(&payload)?;
        let artifact = Self::bind(payload, unit, type_name, references)?;
        tracing::debug!(
            unit = %artifact.unit_name(),
            type_name,
            bytes = artifact.payload.len(),
            "loaded artifact"
        );
        Ok(artifact)
    }

    pub fn load_from_reader(
        mut reader: impl Read,
        type_name: &str,
        references: &ReferenceSet,
    ) -> Result<Self, LoadError> {
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        Self::load_with(payload, type_name, references)
    }

    pub fn load_from_file(path: impl AsRef<Path>, type_name: &str) -> Result<Self, LoadError> {
        Self::load_from_file_with(path, type_name, &ReferenceSet::standard())
    }

    pub fn load_from_file_with(
        path: impl AsRef<Path>,
        type_name: &str,
        references: &ReferenceSet,
    ) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        Self::load_from_reader(std::io::BufReader::new(file), type_name, references)
    }

    pub async fn load_from_file_async(
        path: impl AsRef<Path>,
        type_name: &str,
        references: &ReferenceSet,
    ) -> Result<Self, LoadError> {
        let payload = tokio::fs::read(path).await?;
        Self::load_with(payload, type_name, references)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn entry_type(&self) -> &EntryType {
        &self.entry
    }

    pub fn type_name(&self) -> &str {
        self.entry.type_name()
    }

    /// Module name assigned at compile time
    pub fn unit_name(&self) -> &str {
        &self.entry.unit.name
    }

    /// A fresh instance of the entry type
    pub fn instantiate(&self) -> Result<TemplateInstance, RenderError> {
        TemplateInstance::new(Arc::clone(&self.entry))
    }

    /// Render with `model` in a new instance
    pub fn run(&self, model: impl Into<Value>) -> Result<String, RenderError> {
        let model = model.into();
        self.run_with(|instance| {
            instance.set_model(model);
            Ok(())
        })
    }

    /// Render in a new instance prepared by `init` (model, base type
    /// properties)
    pub fn run_with(
        &self,
        init: impl FnOnce(&mut TemplateInstance) -> Result<(), RenderError>,
    ) -> Result<String, RenderError> {
        let mut instance = self.instantiate()?;
        init(&mut instance)?;
        instance.execute()?;
        instance.into_result()
    }

    /// Render on the blocking thread pool
    pub async fn run_async(&self, model: Value) -> Result<String, RenderError> {
        let artifact = self.clone();
        tokio::task::spawn_blocking(move || artifact.run(model))
            .await
            .map_err(|err| RenderError::Aborted(err.to_string()))?
    }

    pub fn save_to_writer(&self, mut writer: impl Write) -> std::io::Result<()> {
        writer.write_all(&self.payload)?;
        writer.flush()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.save_to_writer(std::io::BufWriter::new(file))
    }

    pub async fn save_to_file_async(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        tokio::fs::write(path, &self.payload[..]).await
    }

    /// Reference this artifact from later compilations
    pub fn to_metadata_reference(&self) -> MetadataReference {
        MetadataReference::from_bytes(Arc::clone(&self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ir::{FunctionImage, Instr};

    fn unit() -> UnitImage {
        UnitImage {
            name: "unit".to_string(),
            modules: vec!["Stencil".to_string()],
            types: vec![TypeImage {
                full_name: "Pages.Index".to_string(),
                kind: TypeKind::Template,
                base: Some(crate::program::ir::BaseRef {
                    full_name: "Stencil.TemplateBase".to_string(),
                    module: "Stencil".to_string(),
                    generic_args: Vec::new(),
                }),
                functions: Vec::new(),
                execute: Some(FunctionImage {
                    name: "execute".to_string(),
                    params: 0,
                    slots: 0,
                    body: vec![Instr::EndAttribute],
                    local: false,
                }),
            }],
        }
    }

    #[test]
    fn test_payload_header() {
        let payload = encode_unit(&unit()).expect("encodes");
        assert_eq!(&payload[..4], b"STNL");
        assert_eq!(u16::from_le_bytes([payload[4], payload[5]]), FORMAT_VERSION);
        assert_eq!(decode_unit(&payload).expect("decodes"), unit());
    }

    #[test]
    fn test_rejects_foreign_payloads() {
        assert!(matches!(
            decode_unit(b"MZ\x90\x00"),
            Err(LoadError::InvalidArtifact { .. })
        ));
        assert!(matches!(decode_unit(b"STNL"), Err(LoadError::InvalidArtifact { .. })));

        let mut payload = encode_unit(&unit()).expect("encodes");
        payload[4] = 99;
        let err = decode_unit(&payload).expect_err("bad version");
        assert!(err.to_string().contains("unsupported format version 99"));
    }

    #[test]
    fn test_type_not_found() {
        let payload = encode_unit(&unit()).expect("encodes");
        let err = CompiledArtifact::load(payload, "Pages.Missing").expect_err("missing type");
        assert!(matches!(
            err,
            LoadError::TypeNotFound { ref type_name, ref module } if type_name == "Pages.Missing" && module == "unit"
        ));
    }

    #[test]
    fn test_missing_reference() {
        let payload = encode_unit(&unit()).expect("encodes");
        let err = CompiledArtifact::load_with(payload, "Pages.Index", &ReferenceSet::new())
            .expect_err("no modules");
        assert!(matches!(err, LoadError::MissingReference { ref name } if name == "Stencil"));
    }

    #[test]
    fn test_load_binds_entry_type() {
        let payload = encode_unit(&unit()).expect("encodes");
        let artifact = CompiledArtifact::load(payload.clone(), "Pages.Index").expect("loads");
        assert_eq!(artifact.type_name(), "Pages.Index");
        assert_eq!(artifact.payload(), payload.as_slice());
        assert!(artifact.entry_type().is_instantiable());
        assert!(artifact.entry_type().base().is_some());
    }
}
