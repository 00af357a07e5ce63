//! Execution runtime
//!
//! A [`TemplateInstance`] is one render of an entry type: it owns the model,
//! the base type's property slots and the output buffer. Instances are single
//! use; every render allocates a new one from the artifact.

mod encode;
mod interp;
mod methods;
mod output;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::artifact::EntryType;
use crate::error::RenderError;
use crate::value::{wrap_if_anonymous, Value};

pub use encode::html_encode;
pub use interp::MAX_CALL_DEPTH;

use interp::Interpreter;
use output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    Failed,
    Done,
}

/// A single-use instance of a compiled template type
#[derive(Debug)]
pub struct TemplateInstance {
    entry: Arc<EntryType>,
    model: Value,
    properties: IndexMap<String, Value>,
    output: Output,
    phase: Phase,
}

impl TemplateInstance {
    /// Allocate an instance; library types cannot be instantiated
    pub fn new(entry: Arc<EntryType>) -> Result<Self, RenderError> {
        if !entry.is_instantiable() {
            return Err(RenderError::Allocation {
                type_name: entry.type_name().to_string(),
                reason: "only template types can be instantiated".to_string(),
            });
        }
        let properties = entry
            .base()
            .map(|base| {
                base.properties()
                    .iter()
                    .map(|name| (name.clone(), Value::Null))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            entry,
            model: Value::Null,
            properties,
            output: Output::default(),
            phase: Phase::Ready,
        })
    }

    /// Bind the model. Anonymous records go through the dynamic model wrapper.
    pub fn set_model(&mut self, model: impl Into<Value>) {
        self.model = wrap_if_anonymous(model.into());
    }

    pub fn model(&self) -> &Value {
        &self.model
    }

    /// Set a property declared by the base type
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> Result<(), RenderError> {
        match self.properties.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(RenderError::MemberNotFound {
                type_name: self.entry.type_name().to_string(),
                member: name.to_string(),
            }),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn write(&mut self, value: &Value) {
        self.output.write(value);
    }

    pub fn write_literal(&mut self, value: &Value) {
        self.output.write_literal(value);
    }

    pub fn begin_write_attribute(
        &mut self,
        name: &str,
        prefix: &str,
        suffix: &str,
        expected_values: usize,
    ) -> Result<(), RenderError> {
        self.output.begin_attribute(name, prefix, suffix, expected_values)
    }

    pub fn write_attribute_value(&mut self, prefix: &str, value: &Value) -> Result<(), RenderError> {
        self.output.attribute_value(prefix, value)
    }

    pub fn end_write_attribute(&mut self) -> Result<(), RenderError> {
        self.output.end_attribute()
    }

    /// Run the template body. An instance executes at most once.
    pub fn execute(&mut self) -> Result<(), RenderError> {
        if self.phase != Phase::Ready {
            return Err(RenderError::contract("execute", "the instance has already executed"));
        }
        self.phase = Phase::Failed;

        let span = tracing::debug_span!("execute", type_name = %self.entry.type_name());
        let _guard = span.enter();

        let mut interpreter = Interpreter::new(
            &self.entry,
            &self.model,
            &mut self.properties,
            &mut self.output,
        );
        interpreter.execute()?;

        if !self.output.is_idle() {
            return Err(RenderError::contract("execute", "an attribute is still open"));
        }
        self.phase = Phase::Done;
        tracing::trace!(bytes = self.output.as_str().len(), "template executed");
        Ok(())
    }

    /// Rendered text; only available after a successful `execute`
    pub fn result(&self) -> Result<&str, RenderError> {
        match self.phase {
            Phase::Done => Ok(self.output.as_str()),
            _ => Err(RenderError::contract("result", "the instance has not executed successfully")),
        }
    }

    pub fn into_result(self) -> Result<String, RenderError> {
        match self.phase {
            Phase::Done => Ok(self.output.into_string()),
            _ => Err(RenderError::contract("result", "the instance has not executed successfully")),
        }
    }
}
