//! Resolved program representation stored inside artifacts
//!
//! Names are resolved before anything is written here: locals are frame
//! slots, calls carry their target, and the base contract operations are
//! dedicated instructions.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A compiled unit: every type of one compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitImage {
    /// Module (file) name assigned to the unit
    pub name: String,
    /// Native modules the unit calls into; all must be bound at load time
    pub modules: Vec<String>,
    pub types: Vec<TypeImage>,
}

impl UnitImage {
    pub fn find_type(&self, full_name: &str) -> Option<(usize, &TypeImage)> {
        self.types
            .iter()
            .enumerate()
            .find(|(_, t)| t.full_name == full_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// Instantiable; has a model, output and an execute body
    Template,
    /// Static functions only
    Library,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeImage {
    pub full_name: String,
    pub kind: TypeKind,
    pub base: Option<BaseRef>,
    pub functions: Vec<FunctionImage>,
    pub execute: Option<FunctionImage>,
}

/// Reference to the base type a template inherits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRef {
    pub full_name: String,
    pub module: String,
    /// Rendered generic arguments, kept for display only
    pub generic_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionImage {
    pub name: String,
    /// Parameters occupy the first `params` slots of the frame
    pub params: usize,
    pub slots: usize,
    pub body: Vec<Instr>,
    /// Local functions are only reachable from the block declaring them
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Let(usize, Expr),
    Assign(Target, Expr),
    Eval(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Vec<Instr>,
        otherwise: Vec<Instr>,
    },
    ForEach {
        slot: usize,
        source: Expr,
        body: Vec<Instr>,
    },
    While {
        cond: Expr,
        body: Vec<Instr>,
    },
    Write(Expr),
    WriteLiteral(Expr),
    BeginAttribute {
        name: Expr,
        prefix: Expr,
        suffix: Expr,
        count: Expr,
    },
    AttributeValue {
        prefix: Expr,
        value: Expr,
    },
    EndAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Local(usize),
    Property(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Const {
    pub fn to_value(&self) -> Value {
        match self {
            Const::Null => Value::Null,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            Const::Float(f) => Value::Float(*f),
            Const::Str(s) => Value::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Const),
    Local(usize),
    Model,
    /// Base type property
    Property(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Callee, Vec<Expr>),
    /// Built-in method on a value
    Method(Box<Expr>, String, Vec<Arg>),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// Function of the executing type, by index
    Function(usize),
    /// Function of a static class linked into the unit
    Library { class: String, function: usize },
    Native { module: String, function: String },
    BaseMethod(String),
}

/// Method argument; lambdas are only valid here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Value(Expr),
    /// Parameters are slots of the enclosing frame
    Lambda { params: Vec<usize>, body: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
        }
    }
}
