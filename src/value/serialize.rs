//! Serialize any type implementing `Serialize` into a [`Value`].
//!
//! Structs become nominal records named after the struct, so templates see
//! them as declared types. Maps become [`Mapping`]s and sequences become
//! [`Value::Seq`].
//!
//! ```
//! use serde::Serialize;
//! use stencil::value::to_value;
//!
//! #[derive(Serialize)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let value = to_value(&Person { name: "Alice".into(), age: 30 }).unwrap();
//! assert!(!value.is_anonymous());
//! assert_eq!(value.try_get_member("name").unwrap().as_str(), Some("Alice"));
//! ```

use serde::ser::{self, Serialize};
use thiserror::Error;

use super::{MapKey, Mapping, NominalRecord, Value};
use crate::type_name::TypeName;

/// Error raised while converting a serializable type into a [`Value`]
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("map keys must be booleans, integers or strings, found {0}")]
    UnsupportedKey(String),

    #[error("map value serialized before its key")]
    MissingKey,

    #[error("{0}")]
    Custom(String),
}

impl ser::Error for ValueError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ValueError::Custom(msg.to_string())
    }
}

/// Convert `value` into a dynamic [`Value`]
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, ValueError> {
    value.serialize(ValueSerializer)
}

fn nominal(name: &str) -> NominalRecord {
    NominalRecord::new(TypeName::new("", name))
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = ValueError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = StructBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, ValueError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, ValueError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, ValueError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, ValueError> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, ValueError> {
        Ok(Value::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, ValueError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, ValueError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, ValueError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, ValueError> {
        Ok(Value::Seq(v.iter().map(|b| Value::Int(i64::from(*b))).collect()))
    }

    fn serialize_none(self) -> Result<Value, ValueError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, ValueError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, ValueError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value, ValueError> {
        Ok(Value::object(nominal(name)))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, ValueError> {
        Ok(Value::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, ValueError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, ValueError> {
        let inner = value.serialize(ValueSerializer)?;
        Ok(Value::object(nominal(name).with_field(variant, inner)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, ValueError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, ValueError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, ValueError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, ValueError> {
        Ok(VariantSeqBuilder {
            name,
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, ValueError> {
        Ok(MapBuilder {
            map: Mapping::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<StructBuilder, ValueError> {
        Ok(StructBuilder {
            record: nominal(name),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructBuilder, ValueError> {
        Ok(StructBuilder {
            record: nominal(variant),
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ValueError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ValueError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, ValueError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ValueError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, ValueError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    name: &'static str,
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ValueError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::object(
            nominal(self.name).with_field(self.variant, Value::Seq(self.items)),
        ))
    }
}

struct MapBuilder {
    map: Mapping,
    pending_key: Option<MapKey>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), ValueError> {
        let key = key.serialize(ValueSerializer)?;
        let map_key =
            MapKey::from_value(&key).ok_or_else(|| ValueError::UnsupportedKey(key.type_name()))?;
        self.pending_key = Some(map_key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ValueError> {
        let key = self.pending_key.take().ok_or(ValueError::MissingKey)?;
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Map(self.map))
    }
}

struct StructBuilder {
    record: NominalRecord,
}

impl StructBuilder {
    fn push<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), ValueError> {
        let value = value.serialize(ValueSerializer)?;
        let record = std::mem::replace(&mut self.record, nominal(""));
        self.record = record.with_field(key, value);
        Ok(())
    }
}

impl ser::SerializeStruct for StructBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ValueError> {
        self.push(key, value)
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::object(self.record))
    }
}

impl ser::SerializeStructVariant for StructBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ValueError> {
        self.push(key, value)
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::object(self.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Membership {
        #[serde(rename = "Level")]
        level: String,
    }

    #[derive(Serialize)]
    struct User {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Membership")]
        membership: Option<Membership>,
        #[serde(rename = "Tags")]
        tags: Vec<&'static str>,
    }

    #[derive(Serialize)]
    enum Shape {
        Circle(f64),
        Point,
    }

    #[test]
    fn test_struct_becomes_nominal_record() {
        let user = User {
            name: "Alex".into(),
            membership: Some(Membership { level: "Gold".into() }),
            tags: vec!["a", "b"],
        };
        let value = to_value(&user).expect("serializable");

        assert_eq!(value.type_name(), "User");
        assert!(!value.is_anonymous());
        let membership = value.try_get_member("Membership").expect("field exists");
        assert_eq!(membership.try_get_member("Level"), Some(Value::from("Gold")));
        assert_eq!(
            value.try_get_member("Tags"),
            Some(Value::from(vec!["a", "b"]))
        );
    }

    #[test]
    fn test_none_field_is_null() {
        let user = User {
            name: "Alex".into(),
            membership: None,
            tags: Vec::new(),
        };
        let value = to_value(&user).expect("serializable");
        assert_eq!(value.try_get_member("Membership"), Some(Value::Null));
    }

    #[test]
    fn test_maps_and_enums() {
        let mut map = BTreeMap::new();
        map.insert("K1", 1);
        map.insert("K2", 2);
        let value = to_value(&map).expect("serializable");
        assert_eq!(value.try_get_member("Count"), Some(Value::Int(2)));

        assert_eq!(to_value(&Shape::Point).expect("serializable"), Value::from("Point"));
        let circle = to_value(&Shape::Circle(1.5)).expect("serializable");
        assert_eq!(circle.try_get_member("Circle"), Some(Value::Float(1.5)));
    }

    #[test]
    fn test_unsupported_map_key() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(matches!(to_value(&map), Err(ValueError::UnsupportedKey(_))));
    }
}
