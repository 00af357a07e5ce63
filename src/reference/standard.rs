//! Modules every compilation references by default

use std::sync::{Arc, OnceLock};

use super::{BaseType, Module, NativeFunction};
use crate::error::RenderError;
use crate::runtime::html_encode;
use crate::type_name::TypeName;
use crate::value::Value;

pub const CORE_MODULE: &str = "Stencil";
pub const TEXT_MODULE: &str = "Stencil.Text";
pub const COLLECTIONS_MODULE: &str = "Stencil.Collections";

/// Base type templates inherit unless configured otherwise
pub const DEFAULT_BASE_TYPE: &str = "Stencil.TemplateBase";

static CORE: OnceLock<Arc<Module>> = OnceLock::new();
static TEXT: OnceLock<Arc<Module>> = OnceLock::new();
static COLLECTIONS: OnceLock<Arc<Module>> = OnceLock::new();

/// `Stencil`: home of the default base type
pub fn core_module() -> Arc<Module> {
    Arc::clone(CORE.get_or_init(|| {
        Arc::new(
            Module::new(CORE_MODULE)
                .with_base_type(BaseType::new(TypeName::new(CORE_MODULE, "TemplateBase"))),
        )
    }))
}

/// `Stencil.Text`: `Raw(x)`, `Encode(x)`, `Join(separator, items)`
pub fn text_module() -> Arc<Module> {
    Arc::clone(TEXT.get_or_init(|| {
        Arc::new(
            Module::new(TEXT_MODULE)
                .with_function(NativeFunction::new("Raw", 1, |args| {
                    Ok(match &args[0] {
                        Value::Null => Value::Null,
                        other => Value::Raw(other.to_display()),
                    })
                }))
                .with_function(NativeFunction::new("Encode", 1, |args| {
                    Ok(Value::Raw(html_encode(&args[0].to_display()).into_owned()))
                }))
                .with_function(NativeFunction::new("Join", 2, |args| {
                    let separator = args[0].to_display();
                    let items = args[1]
                        .iter_values()
                        .ok_or_else(|| not_enumerable("Join", &args[1]))?;
                    Ok(Value::Str(
                        items
                            .iter()
                            .map(Value::to_display)
                            .collect::<Vec<_>>()
                            .join(&separator),
                    ))
                })),
        )
    }))
}

/// `Stencil.Collections`: `Range(start, count)`, `Repeat(value, count)`, `Len(x)`
pub fn collections_module() -> Arc<Module> {
    Arc::clone(COLLECTIONS.get_or_init(|| {
        Arc::new(
            Module::new(COLLECTIONS_MODULE)
                .with_function(NativeFunction::new("Range", 2, |args| {
                    let start = int_arg("Range", &args[0])?;
                    let count = count_arg("Range", &args[1])?;
                    Ok(Value::Seq(
                        (0..count).map(|i| Value::Int(start + i)).collect(),
                    ))
                }))
                .with_function(NativeFunction::new("Repeat", 2, |args| {
                    let count = count_arg("Repeat", &args[1])?;
                    Ok(Value::Seq(vec![args[0].clone(); count as usize]))
                }))
                .with_function(NativeFunction::new("Len", 1, |args| {
                    let len = match &args[0] {
                        Value::Str(s) | Value::Raw(s) => s.chars().count(),
                        Value::Seq(items) => items.len(),
                        Value::Map(map) => map.len(),
                        other => return Err(not_enumerable("Len", other)),
                    };
                    Ok(Value::from(len))
                })),
        )
    }))
}

fn int_arg(function: &str, value: &Value) -> Result<i64, RenderError> {
    value.as_int().ok_or_else(|| {
        RenderError::native(function, format!("expected an int, got {}", value.type_name()))
    })
}

fn count_arg(function: &str, value: &Value) -> Result<i64, RenderError> {
    let count = int_arg(function, value)?;
    if count < 0 {
        return Err(RenderError::native(function, "count must not be negative"));
    }
    Ok(count)
}

fn not_enumerable(function: &str, value: &Value) -> RenderError {
    RenderError::native(
        function,
        format!("{} is not enumerable", value.type_name()),
    )
}
