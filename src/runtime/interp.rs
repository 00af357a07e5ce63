//! Tree-walking evaluator for resolved programs

use indexmap::IndexMap;

use crate::artifact::EntryType;
use crate::error::RenderError;
use crate::program::ir::{BinaryOp, Callee, Expr, FunctionImage, Instr, Target, UnaryOp};
use crate::value::{MapKey, Value};

use super::output::Output;

pub const MAX_CALL_DEPTH: usize = 128;

enum Flow {
    Next,
    Return(Value),
}

/// Slots of one function activation
pub(super) type Frame = Vec<Value>;

pub(crate) struct Interpreter<'a> {
    pub(super) entry: &'a EntryType,
    model: &'a Value,
    properties: &'a mut IndexMap<String, Value>,
    output: &'a mut Output,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        entry: &'a EntryType,
        model: &'a Value,
        properties: &'a mut IndexMap<String, Value>,
        output: &'a mut Output,
    ) -> Self {
        Self {
            entry,
            model,
            properties,
            output,
            depth: 0,
        }
    }

    /// Run the entry type's execute body
    pub fn execute(&mut self) -> Result<(), RenderError> {
        let entry = self.entry;
        let Some(execute) = entry.image().execute.as_ref() else {
            return Err(RenderError::Allocation {
                type_name: entry.type_name().to_string(),
                reason: "the type has no execute body".to_string(),
            });
        };
        self.invoke(entry.type_index(), execute, Vec::new())?;
        Ok(())
    }

    fn invoke(
        &mut self,
        ty: usize,
        function: &FunctionImage,
        args: Vec<Value>,
    ) -> Result<Value, RenderError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RenderError::Aborted(format!(
                "call depth limit of {MAX_CALL_DEPTH} exceeded in '{}'",
                function.name
            )));
        }
        let mut frame = args;
        frame.resize(function.slots.max(function.params), Value::Null);

        self.depth += 1;
        let flow = self.block(ty, &mut frame, &function.body);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Null),
        }
    }

    fn call_function(
        &mut self,
        ty: usize,
        index: usize,
        args: Vec<Value>,
    ) -> Result<Value, RenderError> {
        let entry = self.entry;
        let image = entry
            .unit()
            .types
            .get(ty)
            .ok_or_else(|| RenderError::mismatch("call", "unknown type"))?;
        let function = image.functions.get(index).ok_or_else(|| RenderError::MemberNotFound {
            type_name: image.full_name.clone(),
            member: format!("function #{index}"),
        })?;
        self.invoke(ty, function, args)
    }

    fn block(&mut self, ty: usize, frame: &mut Frame, instrs: &[Instr]) -> Result<Flow, RenderError> {
        for instr in instrs {
            if let Flow::Return(value) = self.instr(ty, frame, instr)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn instr(&mut self, ty: usize, frame: &mut Frame, instr: &Instr) -> Result<Flow, RenderError> {
        match instr {
            Instr::Let(slot, expr) => {
                let value = self.eval(ty, frame, expr)?;
                *slot_mut(frame, *slot)? = value;
            }
            Instr::Assign(target, expr) => {
                let value = self.eval(ty, frame, expr)?;
                match target {
                    Target::Local(slot) => *slot_mut(frame, *slot)? = value,
                    Target::Property(name) => match self.properties.get_mut(name) {
                        Some(property) => *property = value,
                        None => return Err(self.missing_property(name)),
                    },
                }
            }
            Instr::Eval(expr) => {
                self.eval(ty, frame, expr)?;
            }
            Instr::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(ty, frame, expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Instr::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.condition(ty, frame, cond, "if")? {
                    then
                } else {
                    otherwise
                };
                return self.block(ty, frame, branch);
            }
            Instr::ForEach { slot, source, body } => {
                let source = self.eval(ty, frame, source)?;
                for item in enumerate("foreach", &source)? {
                    *slot_mut(frame, *slot)? = item;
                    if let Flow::Return(value) = self.block(ty, frame, body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Instr::While { cond, body } => {
                while self.condition(ty, frame, cond, "while")? {
                    if let Flow::Return(value) = self.block(ty, frame, body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Instr::Write(expr) => {
                let value = self.eval(ty, frame, expr)?;
                self.output.write(&value);
            }
            Instr::WriteLiteral(expr) => {
                let value = self.eval(ty, frame, expr)?;
                self.output.write_literal(&value);
            }
            Instr::BeginAttribute {
                name,
                prefix,
                suffix,
                count,
            } => {
                let name = self.eval(ty, frame, name)?.to_display();
                let prefix = self.eval(ty, frame, prefix)?.to_display();
                let suffix = self.eval(ty, frame, suffix)?.to_display();
                let count = self.eval(ty, frame, count)?;
                let count = count
                    .as_int()
                    .and_then(|c| usize::try_from(c).ok())
                    .ok_or_else(|| {
                        RenderError::mismatch(
                            "BeginWriteAttribute",
                            format!("value count must be a non-negative int, got {}", count.type_name()),
                        )
                    })?;
                self.output.begin_attribute(&name, &prefix, &suffix, count)?;
            }
            Instr::AttributeValue { prefix, value } => {
                let prefix = self.eval(ty, frame, prefix)?.to_display();
                let value = self.eval(ty, frame, value)?;
                self.output.attribute_value(&prefix, &value)?;
            }
            Instr::EndAttribute => self.output.end_attribute()?,
        }
        Ok(Flow::Next)
    }

    fn condition(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        expr: &Expr,
        operation: &str,
    ) -> Result<bool, RenderError> {
        let value = self.eval(ty, frame, expr)?;
        expect_bool(operation, &value)
    }

    pub(super) fn eval(&mut self, ty: usize, frame: &mut Frame, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Const(constant) => Ok(constant.to_value()),
            Expr::Local(slot) => Ok(frame.get(*slot).cloned().unwrap_or_default()),
            Expr::Model => Ok(self.model.clone()),
            Expr::Property(name) => self
                .properties
                .get(name)
                .cloned()
                .ok_or_else(|| self.missing_property(name)),
            Expr::Member(target, name) => {
                let target = self.eval(ty, frame, target)?;
                member(&target, name)
            }
            Expr::Index(target, index) => {
                let target = self.eval(ty, frame, target)?;
                let index = self.eval(ty, frame, index)?;
                self::index(&target, &index)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(ty, frame, operand)?;
                unary(*op, value)
            }
            Expr::Binary(op, lhs, rhs) => self.binary(ty, frame, *op, lhs, rhs),
            Expr::Call(callee, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(ty, frame, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(ty, callee, args)
            }
            Expr::Method(receiver, name, args) => {
                let receiver = self.eval(ty, frame, receiver)?;
                self.method(ty, frame, receiver, name, args)
            }
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(ty, frame, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Seq),
        }
    }

    fn call(&mut self, ty: usize, callee: &Callee, args: Vec<Value>) -> Result<Value, RenderError> {
        match callee {
            Callee::Function(index) => self.call_function(ty, *index, args),
            Callee::Library { class, function } => {
                let (library, _) = self
                    .entry
                    .unit()
                    .find_type(class)
                    .ok_or_else(|| RenderError::MemberNotFound {
                        type_name: self.entry.unit().name.clone(),
                        member: class.clone(),
                    })?;
                self.call_function(library, *function, args)
            }
            Callee::Native { module, function } => {
                let native = self
                    .entry
                    .module(module)
                    .and_then(|m| m.function(function))
                    .ok_or_else(|| RenderError::MemberNotFound {
                        type_name: module.clone(),
                        member: function.clone(),
                    })?;
                native.call(&args)
            }
            Callee::BaseMethod(name) => {
                let method = self
                    .entry
                    .base()
                    .and_then(|base| base.method(name))
                    .ok_or_else(|| RenderError::MemberNotFound {
                        type_name: self.entry.type_name().to_string(),
                        member: name.clone(),
                    })?;
                method.call(&args)
            }
        }
    }

    fn binary(
        &mut self,
        ty: usize,
        frame: &mut Frame,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, RenderError> {
        let left = self.eval(ty, frame, lhs)?;
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let left = expect_bool(op.symbol(), &left)?;
                if left == (op == BinaryOp::Or) {
                    return Ok(Value::Bool(left));
                }
                let right = self.eval(ty, frame, rhs)?;
                Ok(Value::Bool(expect_bool(op.symbol(), &right)?))
            }
            BinaryOp::Coalesce if !left.is_null() => Ok(left),
            BinaryOp::Coalesce => self.eval(ty, frame, rhs),
            _ => {
                let right = self.eval(ty, frame, rhs)?;
                arithmetic(op, &left, &right)
            }
        }
    }

    fn missing_property(&self, name: &str) -> RenderError {
        RenderError::MemberNotFound {
            type_name: self.entry.type_name().to_string(),
            member: name.to_string(),
        }
    }
}

fn slot_mut(frame: &mut Frame, slot: usize) -> Result<&mut Value, RenderError> {
    let len = frame.len();
    frame
        .get_mut(slot)
        .ok_or_else(|| RenderError::mismatch("local", format!("slot {slot} outside a frame of {len}")))
}

pub(super) fn expect_bool(operation: &str, value: &Value) -> Result<bool, RenderError> {
    value.as_bool().ok_or_else(|| {
        RenderError::mismatch(
            operation,
            format!("expected a bool, got {}", value.type_name()),
        )
    })
}

/// Elements of an enumerable value
pub(super) fn enumerate(operation: &str, value: &Value) -> Result<Vec<Value>, RenderError> {
    if value.is_null() {
        return Err(RenderError::NullReference {
            member: operation.to_string(),
        });
    }
    value.iter_values().ok_or_else(|| {
        RenderError::mismatch(operation, format!("{} is not enumerable", value.type_name()))
    })
}

pub(super) fn member(target: &Value, name: &str) -> Result<Value, RenderError> {
    if target.is_null() {
        return Err(RenderError::NullReference {
            member: name.to_string(),
        });
    }
    target
        .try_get_member(name)
        .ok_or_else(|| RenderError::MemberNotFound {
            type_name: target.type_name(),
            member: name.to_string(),
        })
}

fn index(target: &Value, index: &Value) -> Result<Value, RenderError> {
    match target {
        Value::Null => Err(RenderError::NullReference {
            member: format!("[{}]", index.to_display()),
        }),
        Value::Map(map) => {
            let key = MapKey::from_value(index).ok_or_else(|| {
                RenderError::mismatch("index", format!("{} cannot be a map key", index.type_name()))
            })?;
            map.get(&key).ok_or_else(|| RenderError::KeyNotFound {
                key: key.to_string(),
            })
        }
        Value::Seq(items) => {
            let position = int_index(index)?;
            usize::try_from(position)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or(RenderError::IndexOutOfRange {
                    index: position,
                    len: items.len(),
                })
        }
        Value::Str(text) | Value::Raw(text) => {
            let position = int_index(index)?;
            usize::try_from(position)
                .ok()
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .ok_or(RenderError::IndexOutOfRange {
                    index: position,
                    len: text.chars().count(),
                })
        }
        other => match index.as_str() {
            Some(name) => member(other, name),
            None => Err(RenderError::mismatch(
                "index",
                format!("{} cannot be indexed", other.type_name()),
            )),
        },
    }
}

fn int_index(index: &Value) -> Result<i64, RenderError> {
    index.as_int().ok_or_else(|| {
        RenderError::mismatch("index", format!("expected an int index, got {}", index.type_name()))
    })
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, RenderError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!expect_bool("!", &value)?)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| RenderError::mismatch("-", "integer overflow")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(RenderError::mismatch(
            "-",
            format!("cannot negate {}", other.type_name()),
        )),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RenderError> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left.loose_eq(right))),
        BinaryOp::Ne => return Ok(Value::Bool(!left.loose_eq(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = left.compare(right).ok_or_else(|| {
                RenderError::mismatch(
                    symbol,
                    format!("cannot compare {} with {}", left.type_name(), right.type_name()),
                )
            })?;
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        BinaryOp::Add if is_text(left) || is_text(right) => {
            return Ok(Value::Str(left.to_display() + &right.to_display()));
        }
        _ => {}
    }

    let mismatch = || {
        RenderError::mismatch(
            symbol,
            format!(
                "unsupported operands {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
    };

    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
            return Err(RenderError::mismatch(symbol, "division by zero"));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => return Err(mismatch()),
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| RenderError::mismatch(symbol, "integer overflow"));
    }

    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(mismatch());
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(mismatch()),
    };
    Ok(Value::Float(result))
}

fn is_text(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Raw(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_concatenation() {
        let result = arithmetic(BinaryOp::Add, &Value::from("a"), &Value::Int(1)).expect("concat");
        assert_eq!(result, Value::from("a1"));
        let result = arithmetic(BinaryOp::Add, &Value::Null, &Value::from("b")).expect("concat");
        assert_eq!(result, Value::from("b"));
    }

    #[test]
    fn test_integer_arithmetic_is_checked() {
        assert_eq!(
            arithmetic(BinaryOp::Mul, &Value::Int(6), &Value::Int(7)).expect("mul"),
            Value::Int(42)
        );
        assert!(arithmetic(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).is_err());
        assert!(arithmetic(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
        assert_eq!(
            arithmetic(BinaryOp::Div, &Value::Int(7), &Value::Float(2.0)).expect("div"),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            arithmetic(BinaryOp::Le, &Value::Int(2), &Value::Float(2.0)).expect("cmp"),
            Value::Bool(true)
        );
        assert!(arithmetic(BinaryOp::Lt, &Value::Int(1), &Value::from("x")).is_err());
        assert_eq!(
            arithmetic(BinaryOp::Ne, &Value::Null, &Value::Int(0)).expect("ne"),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_indexing() {
        let seq = Value::from(vec![10, 20]);
        assert_eq!(index(&seq, &Value::Int(1)).expect("in range"), Value::Int(20));
        assert!(matches!(
            index(&seq, &Value::Int(2)),
            Err(RenderError::IndexOutOfRange { index: 2, len: 2 })
        ));

        let map = crate::mapping! { "K1" => "V1" };
        assert_eq!(index(&map, &Value::from("K1")).expect("key"), Value::from("V1"));
        assert!(matches!(
            index(&map, &Value::from("K2")),
            Err(RenderError::KeyNotFound { ref key }) if key == "K2"
        ));
        assert!(matches!(
            index(&Value::Null, &Value::Int(0)),
            Err(RenderError::NullReference { .. })
        ));
    }

    #[test]
    fn test_member_errors() {
        assert!(matches!(
            member(&Value::Null, "Name"),
            Err(RenderError::NullReference { ref member }) if member == "Name"
        ));
        assert!(matches!(
            member(&Value::Int(1), "Name"),
            Err(RenderError::MemberNotFound { .. })
        ));
    }
}
