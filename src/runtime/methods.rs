//! Built-in methods callable on values (`x.ToUpper()`, `items.Where(i => ...)`)

use std::cmp::Ordering;

use crate::error::RenderError;
use crate::program::ir::Arg;
use crate::value::{MapKey, Value};

use super::interp::{enumerate, expect_bool, Frame, Interpreter};

impl Interpreter<'_> {
    pub(super) fn method(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        receiver: Value,
        name: &str,
        args: &[Arg],
    ) -> Result<Value, RenderError> {
        if receiver.is_null() {
            return Err(RenderError::NullReference {
                member: name.to_string(),
            });
        }

        match name {
            "ToString" => {
                arity(name, args, 0, 0)?;
                Ok(Value::Str(receiver.to_display()))
            }
            "ToUpper" | "ToLower" | "Trim" => {
                arity(name, args, 0, 0)?;
                let text = text(name, &receiver)?;
                Ok(Value::Str(match name {
                    "ToUpper" => text.to_uppercase(),
                    "ToLower" => text.to_lowercase(),
                    _ => text.trim().to_string(),
                }))
            }
            "Contains" => {
                arity(name, args, 1, 1)?;
                let needle = self.value_arg(ty, frame, name, &args[0])?;
                match &receiver {
                    Value::Seq(items) => Ok(Value::Bool(items.iter().any(|i| i.loose_eq(&needle)))),
                    other => {
                        let text = text(name, other)?;
                        Ok(Value::Bool(text.contains(&needle.to_display())))
                    }
                }
            }
            "StartsWith" | "EndsWith" => {
                arity(name, args, 1, 1)?;
                let affix = self.value_arg(ty, frame, name, &args[0])?.to_display();
                let text = text(name, &receiver)?;
                Ok(Value::Bool(if name == "StartsWith" {
                    text.starts_with(&affix)
                } else {
                    text.ends_with(&affix)
                }))
            }
            "ContainsKey" => {
                arity(name, args, 1, 1)?;
                let key = self.value_arg(ty, frame, name, &args[0])?;
                let Value::Map(map) = &receiver else {
                    return Err(unsupported(name, &receiver));
                };
                Ok(Value::Bool(
                    MapKey::from_value(&key).is_some_and(|key| map.contains_key(&key)),
                ))
            }
            "Reverse" => {
                arity(name, args, 0, 0)?;
                match &receiver {
                    Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
                    other => {
                        let mut items = enumerate(name, other)?;
                        items.reverse();
                        Ok(Value::Seq(items))
                    }
                }
            }
            "OrderBy" | "OrderByDescending" => {
                arity(name, args, 0, 1)?;
                let items = enumerate(name, &receiver)?;
                let mut keyed = Vec::with_capacity(items.len());
                for (position, item) in items.into_iter().enumerate() {
                    let key = match args.first() {
                        Some(selector) => self.apply(ty, frame, name, selector, &item, position)?,
                        None => item.clone(),
                    };
                    keyed.push((key, item));
                }
                sort_by_key(name, &mut keyed, name == "OrderByDescending")?;
                Ok(Value::Seq(keyed.into_iter().map(|(_, item)| item).collect()))
            }
            "Where" => {
                arity(name, args, 1, 1)?;
                let mut kept = Vec::new();
                for (position, item) in enumerate(name, &receiver)?.into_iter().enumerate() {
                    if self.predicate(ty, frame, name, &args[0], &item, position)? {
                        kept.push(item);
                    }
                }
                Ok(Value::Seq(kept))
            }
            "Select" => {
                arity(name, args, 1, 1)?;
                let items = enumerate(name, &receiver)?;
                let mut mapped = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    mapped.push(self.apply(ty, frame, name, &args[0], item, position)?);
                }
                Ok(Value::Seq(mapped))
            }
            "Any" | "Count" | "First" => {
                arity(name, args, 0, 1)?;
                let items = enumerate(name, &receiver)?;
                let mut matching = Vec::new();
                for (position, item) in items.into_iter().enumerate() {
                    let keep = match args.first() {
                        Some(predicate) => self.predicate(ty, frame, name, predicate, &item, position)?,
                        None => true,
                    };
                    if keep {
                        matching.push(item);
                        if name != "Count" {
                            break;
                        }
                    }
                }
                match name {
                    "Any" => Ok(Value::Bool(!matching.is_empty())),
                    "Count" => Ok(Value::from(matching.len())),
                    _ => matching.into_iter().next().ok_or_else(|| {
                        RenderError::mismatch(name, "the sequence contains no matching element")
                    }),
                }
            }
            _ => Err(RenderError::MemberNotFound {
                type_name: receiver.type_name(),
                member: name.to_string(),
            }),
        }
    }

    fn value_arg(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        method: &str,
        arg: &Arg,
    ) -> Result<Value, RenderError> {
        match arg {
            Arg::Value(expr) => self.eval(ty, frame, expr),
            Arg::Lambda { .. } => Err(RenderError::mismatch(
                method,
                "a lambda is not valid for this argument",
            )),
        }
    }

    /// Call a lambda argument with `item` (and its position for two-parameter
    /// lambdas)
    fn apply(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        method: &str,
        arg: &Arg,
        item: &Value,
        position: usize,
    ) -> Result<Value, RenderError> {
        let Arg::Lambda { params, body } = arg else {
            return Err(RenderError::mismatch(method, "expected a lambda argument"));
        };
        let bound = [item.clone(), Value::from(position)];
        for (slot, value) in params.iter().zip(bound) {
            match frame.get_mut(*slot) {
                Some(local) => *local = value,
                None => return Err(RenderError::mismatch(method, "lambda parameter outside the frame")),
            }
        }
        self.eval(ty, frame, body)
    }

    fn predicate(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        method: &str,
        arg: &Arg,
        item: &Value,
        position: usize,
    ) -> Result<bool, RenderError> {
        let result = self.apply(ty, frame, method, arg, item, position)?;
        expect_bool(method, &result)
    }
}

fn arity(method: &str, args: &[Arg], min: usize, max: usize) -> Result<(), RenderError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    };
    Err(RenderError::mismatch(
        method,
        format!("expected {expected} argument(s), got {}", args.len()),
    ))
}

fn text<'v>(method: &str, value: &'v Value) -> Result<&'v str, RenderError> {
    value.as_str().ok_or_else(|| unsupported(method, value))
}

fn unsupported(method: &str, value: &Value) -> RenderError {
    RenderError::MemberNotFound {
        type_name: value.type_name(),
        member: method.to_string(),
    }
}

/// Stable sort on precomputed keys; keys must be mutually comparable
fn sort_by_key(
    method: &str,
    keyed: &mut [(Value, Value)],
    descending: bool,
) -> Result<(), RenderError> {
    let mut incomparable = None;
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.compare(b).unwrap_or_else(|| {
            incomparable.get_or_insert_with(|| (a.type_name(), b.type_name()));
            Ordering::Equal
        });
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    match incomparable {
        Some((a, b)) => Err(RenderError::mismatch(
            method,
            format!("cannot compare {a} with {b}"),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ir::Expr;

    fn keyed(values: Vec<Value>) -> Vec<(Value, Value)> {
        values.into_iter().map(|v| (v.clone(), v)).collect()
    }

    #[test]
    fn test_sort_is_stable_and_reversible() {
        let mut items = keyed(vec![Value::Int(2), Value::Int(3), Value::Int(1)]);
        sort_by_key("OrderByDescending", &mut items, true).expect("sorts");
        let sorted: Vec<Value> = items.into_iter().map(|(_, v)| v).collect();
        assert_eq!(sorted, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_sort_rejects_mixed_keys() {
        let mut items = keyed(vec![Value::Int(2), Value::from("a")]);
        let err = sort_by_key("OrderBy", &mut items, false).expect_err("mixed");
        assert!(err.to_string().contains("cannot compare"));
    }

    #[test]
    fn test_arity_message() {
        assert!(arity("Trim", &[], 0, 0).is_ok());
        let args = vec![Arg::Value(Expr::Model), Arg::Value(Expr::Model)];
        let err = arity("OrderBy", &args, 0, 1).expect_err("too many");
        assert!(err.to_string().contains("expected 0 to 1 argument(s), got 2"));
    }
}
