//! Dynamic model wrapper for anonymous records
//!
//! Wrapping is lazy: a [`StructuralWrapper`] only wraps what it hands out, one
//! hop at a time. Nested anonymous data is reached by going back through the
//! wrapper returned by the previous lookup.

use std::fmt;

use super::{Record, StructuralValue, Value};
use crate::type_name::TypeName;

/// Transparent proxy giving member access to an anonymous record
#[derive(Clone, PartialEq)]
pub struct StructuralWrapper {
    inner: Record,
}

impl StructuralWrapper {
    pub fn new(inner: Record) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Record {
        &self.inner
    }

    /// Look up `name` on the wrapped record.
    ///
    /// - missing member: `None`
    /// - null member: `Some(Value::Null)`
    /// - anonymous record: wrapped before it is returned
    /// - map: returned as is, after its anonymous entries were wrapped in place
    /// - sequence: a new sequence with anonymous elements wrapped
    /// - anything else: returned unchanged
    pub fn try_get_member(&self, name: &str) -> Option<Value> {
        let value = self.inner.get(name)?;

        let result = match value {
            Value::Null => Value::Null,
            Value::Record(record) => Value::Wrapped(StructuralWrapper::new(record.clone())),
            Value::Map(map) => {
                map.wrap_anonymous_entries();
                Value::Map(map.clone())
            }
            Value::Seq(items) => Value::Seq(items.iter().cloned().map(wrap_if_anonymous).collect()),
            other => other.clone(),
        };

        Some(result)
    }
}

/// Wrap `value` if it is an anonymous record, otherwise pass it through
pub fn wrap_if_anonymous(value: Value) -> Value {
    match value {
        Value::Record(record) => Value::Wrapped(StructuralWrapper::new(record)),
        other => other,
    }
}

impl StructuralValue for StructuralWrapper {
    fn type_name(&self) -> TypeName {
        TypeName::new("Stencil", "AnonymousRecord")
    }

    fn try_get_member(&self, name: &str) -> Option<Value> {
        StructuralWrapper::try_get_member(self, name)
    }

    fn display(&self) -> String {
        self.inner.to_string()
    }
}

impl fmt::Debug for StructuralWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StructuralWrapper").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapKey;
    use crate::{mapping, record};

    fn wrap(value: Value) -> StructuralWrapper {
        match value {
            Value::Record(record) => StructuralWrapper::new(record),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_member_access() {
        let model = wrap(record! { Name: "Alex", Membership: record! { Level: "Gold" } });

        assert_eq!(model.try_get_member("Name"), Some(Value::from("Alex")));

        let membership = model.try_get_member("Membership").expect("member exists");
        assert!(matches!(membership, Value::Wrapped(_)));
        assert_eq!(membership.try_get_member("Level"), Some(Value::from("Gold")));
    }

    #[test]
    fn test_missing_member_is_not_found() {
        let model = wrap(record! { Name: "Alex" });
        assert_eq!(model.try_get_member("Age"), None);
    }

    #[test]
    fn test_null_member_is_found() {
        let model = wrap(record! { User: Value::Null });
        assert_eq!(model.try_get_member("User"), Some(Value::Null));
    }

    #[test]
    fn test_map_entries_are_wrapped_in_place() {
        let dictionary = mapping! { "K1" => record! { x: 1 }, "K2" => record! { x: 2 }, "K3" => 3 };
        let original = match &dictionary {
            Value::Map(m) => m.clone(),
            _ => unreachable!(),
        };
        let model = wrap(record! { Dictionary: dictionary });

        let map = match model.try_get_member("Dictionary") {
            Some(Value::Map(map)) => map,
            other => panic!("expected map, got {:?}", other),
        };
        assert!(map.ptr_eq(&original));

        let mut xs = Vec::new();
        for key in map.keys() {
            let entry = map.get(&key).expect("key exists");
            if let Some(x) = entry.try_get_member("x") {
                xs.push(x);
            }
        }
        assert_eq!(xs, vec![Value::Int(1), Value::Int(2)]);

        // The source mapping was rewritten, not copied
        assert!(matches!(original.get(&MapKey::from("K1")), Some(Value::Wrapped(_))));
        assert_eq!(original.get(&MapKey::from("K3")), Some(Value::Int(3)));
    }

    #[test]
    fn test_sequence_elements_are_wrapped() {
        let model = wrap(record! {
            Items: vec![record! { Key: "K1" }, Value::from(7), record! { Key: "K2" }]
        });

        let items = match model.try_get_member("Items") {
            Some(Value::Seq(items)) => items,
            other => panic!("expected sequence, got {:?}", other),
        };
        assert_eq!(items[0].try_get_member("Key"), Some(Value::from("K1")));
        assert_eq!(items[1], Value::Int(7));
        assert_eq!(items[2].try_get_member("Key"), Some(Value::from("K2")));
    }

    #[test]
    fn test_wrapping_is_one_hop_at_a_time() {
        let model = wrap(record! { Outer: vec![Value::from(vec![record! { x: 1 }])] });
        let outer = match model.try_get_member("Outer") {
            Some(Value::Seq(items)) => items,
            other => panic!("expected sequence, got {:?}", other),
        };
        let inner = match &outer[0] {
            Value::Seq(items) => items,
            other => panic!("expected sequence, got {:?}", other),
        };
        assert!(inner[0].is_anonymous());
    }

    #[test]
    fn test_strings_pass_through() {
        let model = wrap(record! { Name: "Alex" });
        assert_eq!(model.try_get_member("Name"), Some(Value::Str("Alex".into())));
    }
}
