//! Dynamic values for untyped data models
//!
//! Templates address their model without static type information. Every model
//! is represented as a [`Value`]; member lookup is dispatched over the value's
//! variant to a [`StructuralValue`] adapter (nominal records, maps, sequences,
//! and the [`StructuralWrapper`] applied to anonymous records).

mod convert;
mod serialize;
mod wrapper;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::type_name::TypeName;

pub use serialize::{to_value, ValueError};
pub use wrapper::{wrap_if_anonymous, StructuralWrapper};

/// Capability interface for values whose members can be looked up by name
pub trait StructuralValue: fmt::Debug + Send + Sync {
    /// Runtime type of the value
    fn type_name(&self) -> TypeName;

    /// Look up a member. `None` means the member does not exist; a member
    /// holding null is returned as `Some(Value::Null)`.
    fn try_get_member(&self, name: &str) -> Option<Value>;

    /// Text written to the output for this value
    fn display(&self) -> String {
        self.type_name().render(true)
    }
}

/// A dynamically typed model value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Markup that is written without HTML encoding
    Raw(String),
    Seq(Vec<Value>),
    Map(Mapping),
    /// A structurally anonymous record, identified by shape only
    Record(Record),
    /// An anonymous record behind the dynamic model wrapper
    Wrapped(StructuralWrapper),
    /// A nominally typed value
    Object(Arc<dyn StructuralValue>),
}

impl Value {
    pub fn object(value: impl StructuralValue + 'static) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is a record with no declared type
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    /// Name of the value's runtime type, for messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Raw(_) => "markup".to_string(),
            Value::Seq(_) => "sequence".to_string(),
            Value::Map(_) => "map".to_string(),
            Value::Record(_) => "anonymous record".to_string(),
            Value::Wrapped(w) => w.type_name().render(true),
            Value::Object(o) => o.type_name().render(true),
        }
    }

    /// Member lookup, dispatched to the adapter for the value's variant.
    ///
    /// Unwrapped anonymous records expose no members; they must pass through
    /// the [`StructuralWrapper`] first.
    pub fn try_get_member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Wrapped(w) => w.try_get_member(name),
            Value::Object(o) => o.try_get_member(name),
            Value::Map(m) => m.try_get_member(name),
            Value::Seq(items) => items.as_slice().try_get_member(name),
            Value::Str(s) | Value::Raw(s) => match name {
                "Length" => Some(Value::Int(s.chars().count() as i64)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Elements produced when iterating the value, if it is enumerable
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::Seq(items) => Some(items.clone()),
            Value::Map(m) => Some(
                m.entries()
                    .into_iter()
                    .map(|(key, value)| {
                        Value::object(
                            NominalRecord::new(TypeName::new("Stencil", "KeyValuePair"))
                                .with_field("Key", key.to_value())
                                .with_field("Value", value),
                        )
                    })
                    .collect(),
            ),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Raw(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used when the value is written to a template
    pub fn to_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) | Value::Raw(s) => s.clone(),
            Value::Seq(items) => {
                let inner = items
                    .iter()
                    .map(|v| v.to_display())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{inner}]")
            }
            Value::Map(_) => "map".to_string(),
            Value::Record(r) => r.to_string(),
            Value::Wrapped(w) => w.display(),
            Value::Object(o) => o.display(),
        }
    }

    /// Equality as seen by the `==` operator
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float() == other.as_float()
            }
            (Value::Str(a) | Value::Raw(a), Value::Str(b) | Value::Raw(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Wrapped(a), Value::Wrapped(b)) => a.inner() == b.inner(),
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// Ordering for comparisons and sorting; `None` when not comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::Str(a) | Value::Raw(a), Value::Str(b) | Value::Raw(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// Key of a [`Mapping`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::Str(s) | Value::Raw(s) => Some(MapKey::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(s)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<i32> for MapKey {
    fn from(i: i32) -> Self {
        MapKey::Int(i64::from(i))
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

/// A shared, insertion-ordered key/value mapping.
///
/// Clones share storage: entries rewritten through one handle (for example
/// when the dynamic model wrapper wraps anonymous entries in place) are
/// visible through every other handle.
#[derive(Clone, Default)]
pub struct Mapping {
    entries: Arc<RwLock<IndexMap<MapKey, Value>>>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MapKey) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<MapKey>, value: impl Into<Value>) -> Option<Value> {
        self.entries.write().insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<MapKey> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.read().values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(MapKey, Value)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether both handles share the same storage
    pub fn ptr_eq(&self, other: &Mapping) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// An independent copy of the entries
    pub fn deep_copy(&self) -> Mapping {
        Mapping {
            entries: Arc::new(RwLock::new(self.entries.read().clone())),
        }
    }

    /// Replace every anonymous record entry by its wrapped form, in place.
    /// Null, already wrapped and non-anonymous entries are left untouched.
    pub fn wrap_anonymous_entries(&self) {
        let mut entries = self.entries.write();
        for value in entries.values_mut() {
            if let Value::Record(record) = value {
                *value = Value::Wrapped(StructuralWrapper::new(record.clone()));
            }
        }
    }
}

impl FromIterator<(MapKey, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (MapKey, Value)>>(iter: I) -> Self {
        Mapping {
            entries: Arc::new(RwLock::new(iter.into_iter().collect())),
        }
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}

impl StructuralValue for Mapping {
    fn type_name(&self) -> TypeName {
        TypeName::new("Stencil", "Map")
    }

    fn try_get_member(&self, name: &str) -> Option<Value> {
        match name {
            "Keys" => Some(Value::Seq(
                self.keys().iter().map(MapKey::to_value).collect(),
            )),
            "Values" => Some(Value::Seq(self.values())),
            "Count" => Some(Value::Int(self.len() as i64)),
            _ => None,
        }
    }
}

impl StructuralValue for [Value] {
    fn type_name(&self) -> TypeName {
        TypeName::new("Stencil", "Sequence")
    }

    fn try_get_member(&self, name: &str) -> Option<Value> {
        match name {
            "Count" | "Length" => Some(Value::Int(self.len() as i64)),
            _ => None,
        }
    }
}

/// A structurally anonymous record: ordered named fields, no declared type
#[derive(Clone, PartialEq)]
pub struct Record {
    fields: Arc<[(String, Value)]>,
}

impl Record {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.loose_eq(other)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect::<Vec<_>>().into(),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|(name, value)| format!("{name} = {}", value.to_display()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{ {fields} }}")
    }
}

/// Builder for [`Record`]
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<(String, Value)>,
}

impl RecordBuilder {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Record {
        self.fields.into_iter().collect()
    }
}

/// A nominally typed record backed by a static field table
#[derive(Debug, Clone)]
pub struct NominalRecord {
    type_name: TypeName,
    fields: Vec<(String, Value)>,
}

impl NominalRecord {
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl StructuralValue for NominalRecord {
    fn type_name(&self) -> TypeName {
        self.type_name.clone()
    }

    fn try_get_member(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Build an anonymous record value
///
/// ```rust
/// use stencil::record;
///
/// let model = record! { Name: "Alex", Membership: record! { Level: "Gold" } };
/// assert!(model.is_anonymous());
/// ```
#[macro_export]
macro_rules! record {
    ($($name:ident : $value:expr),* $(,)?) => {
        $crate::Value::Record($crate::value::Record::from_iter([
            $((stringify!($name).to_string(), $crate::Value::from($value))),*
        ]))
    };
}

/// Build a map value
///
/// ```rust
/// use stencil::mapping;
///
/// let map = mapping! { "K1" => "V1", "K2" => "V2" };
/// assert_eq!(map.try_get_member("Count").and_then(|v| v.as_int()), Some(2));
/// ```
#[macro_export]
macro_rules! mapping {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::Value::Map($crate::value::Mapping::from_iter([
            $(($crate::value::MapKey::from($key), $crate::Value::from($value))),*
        ]))
    };
}
