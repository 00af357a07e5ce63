//! Name resolution: lowers the parsed program into the artifact IR
//!
//! Every name is bound here. Locals become frame slots, calls get a fixed
//! target, and the base contract operations become instructions. Resolution
//! keeps going after an error so that one compile reports as many problems as
//! possible.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::error::{Diagnostic, Origin, Severity, Span};
use crate::program::ast::{ClassDecl, Expr, FnDecl, Member, Spanned, Stmt, TypeRef, Unit};
use crate::program::ir::{
    self, Arg, BaseRef, Callee, Const, FunctionImage, Instr, Target, TypeImage, TypeKind,
};
use crate::reference::{BaseTypeMetadata, ModuleMetadata};

/// Base contract operations with their arities
const CONTRACT: &[(&str, usize)] = &[
    ("Write", 1),
    ("WriteLiteral", 1),
    ("BeginWriteAttribute", 4),
    ("WriteAttributeValue", 2),
    ("EndWriteAttribute", 0),
];

fn contract_arity(name: &str) -> Option<usize> {
    CONTRACT
        .iter()
        .find(|(op, _)| *op == name)
        .map(|(_, arity)| *arity)
}

/// What the program can see besides its own declarations
pub(crate) struct Environment<'a> {
    pub modules: &'a [ModuleMetadata],
    /// Library types linked in from metadata references
    pub linked: &'a [TypeImage],
    pub warnings_as_errors: bool,
}

pub(crate) struct Resolution {
    /// Types declared by the unit followed by the linked library types
    pub types: Vec<TypeImage>,
    /// Modules the resolved code calls into
    pub modules: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub(crate) fn resolve(unit: &Unit, env: &Environment<'_>) -> Resolution {
    let mut resolver = Resolver {
        env,
        namespace: unit.namespace.as_ref().map(|n| n.node.clone()),
        usings: Vec::new(),
        libraries: IndexMap::new(),
        required: IndexSet::new(),
        diagnostics: Vec::new(),
        ty: TypeState::default(),
    };

    resolver.collect_libraries(unit);
    resolver.check_usings(unit);

    let mut defined: HashSet<String> = env.linked.iter().map(|t| t.full_name.clone()).collect();
    let mut types = Vec::new();
    for class in &unit.classes {
        let full_name = resolver.qualify(&class.node.name.node);
        if !defined.insert(full_name.clone()) {
            resolver.error(
                class.node.name.span.clone(),
                format!("the type '{full_name}' is already defined"),
            );
            continue;
        }
        types.push(resolver.class(&class.node, full_name));
    }
    types.extend(env.linked.iter().cloned());

    Resolution {
        types,
        modules: resolver.required.into_iter().collect(),
        diagnostics: resolver.diagnostics,
    }
}

#[derive(Debug, Clone, Copy)]
struct Signature {
    index: usize,
    arity: usize,
}

#[derive(Debug)]
struct Frame {
    scopes: Vec<HashMap<String, usize>>,
    next: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            next: 0,
        }
    }
}

/// Per-type resolution state
#[derive(Debug, Default)]
struct TypeState {
    is_static: bool,
    base: Option<BaseTypeMetadata>,
    own: IndexMap<String, Signature>,
    functions: Vec<FunctionImage>,
    /// One frame per function body being resolved, innermost last
    frames: Vec<Frame>,
    /// Local functions visible per block, innermost last
    fn_scopes: Vec<HashMap<String, Signature>>,
    /// Function index reserved for each hoisted local function, by name offset
    hoisted: HashMap<usize, usize>,
}

enum Local {
    Slot(usize),
    /// Declared in an enclosing function body
    Captured,
}

enum Qualified {
    NotFound,
    Found(Callee, Option<usize>),
    Failed,
}

struct Resolver<'e> {
    env: &'e Environment<'e>,
    namespace: Option<String>,
    usings: Vec<String>,
    /// Public functions of every library type, by full type name
    libraries: IndexMap<String, IndexMap<String, Signature>>,
    required: IndexSet<String>,
    diagnostics: Vec<Diagnostic>,
    ty: TypeState,
}

fn null() -> ir::Expr {
    ir::Expr::Const(Const::Null)
}

fn placeholder(decl: &FnDecl, local: bool) -> FunctionImage {
    FunctionImage {
        name: decl.name.node.clone(),
        params: decl.params.len(),
        slots: decl.params.len(),
        body: Vec::new(),
        local,
    }
}

impl<'e> Resolver<'e> {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(Origin::Program, span, message));
    }

    fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{name}"),
            None => name.to_string(),
        }
    }

    /// Names a path may refer to: as written, under each import, under the
    /// unit namespace
    fn candidates(&self, path: &str) -> Vec<String> {
        let mut candidates = vec![path.to_string()];
        candidates.extend(self.usings.iter().map(|u| format!("{u}.{path}")));
        if let Some(ns) = &self.namespace {
            candidates.push(format!("{ns}.{path}"));
        }
        candidates
    }

    fn collect_libraries(&mut self, unit: &Unit) {
        for class in unit.classes.iter().filter(|c| c.node.is_static) {
            let mut functions = IndexMap::new();
            let decls = class.node.members.iter().filter_map(|m| match m {
                Member::Function(decl) => Some(decl),
                Member::Execute(_) => None,
            });
            for (index, decl) in decls.enumerate() {
                functions
                    .entry(decl.name.node.clone())
                    .or_insert(Signature {
                        index,
                        arity: decl.params.len(),
                    });
            }
            let full_name = self.qualify(&class.node.name.node);
            self.libraries.entry(full_name).or_insert(functions);
        }

        for ty in self.env.linked.iter().filter(|t| t.kind == TypeKind::Library) {
            let functions = ty
                .functions
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.local)
                .map(|(index, f)| {
                    (
                        f.name.clone(),
                        Signature {
                            index,
                            arity: f.params,
                        },
                    )
                })
                .collect();
            self.libraries.entry(ty.full_name.clone()).or_insert(functions);
        }
    }

    fn is_known_namespace(&self, name: &str) -> bool {
        let nested = format!("{name}.");
        self.namespace.as_deref() == Some(name)
            || self.env.modules.iter().any(|m| {
                m.name == name || m.base_types.iter().any(|b| b.full_name.starts_with(&nested))
            })
            || self
                .libraries
                .keys()
                .any(|full| full == name || full.starts_with(&nested))
    }

    fn check_usings(&mut self, unit: &Unit) {
        let mut seen = HashSet::new();
        for using in &unit.usings {
            let name = &using.node;
            if !seen.insert(name.clone()) {
                self.diagnostics.push(Diagnostic::info(
                    Origin::Program,
                    using.span.clone(),
                    format!("the using directive for '{name}' appeared previously"),
                ));
                continue;
            }
            if self.is_known_namespace(name) {
                self.usings.push(name.clone());
            } else {
                let severity = if self.env.warnings_as_errors {
                    Severity::WarningAsError
                } else {
                    Severity::Warning
                };
                self.diagnostics.push(Diagnostic::new(
                    severity,
                    Origin::Program,
                    using.span.clone(),
                    format!("the namespace '{name}' could not be found"),
                ));
            }
        }
    }

    fn find_base(&self, ty: &TypeRef) -> Option<(String, BaseTypeMetadata)> {
        self.candidates(&ty.path).into_iter().find_map(|candidate| {
            self.env.modules.iter().find_map(|m| {
                m.base_types
                    .iter()
                    .find(|b| b.full_name == candidate)
                    .map(|b| (m.name.clone(), b.clone()))
            })
        })
    }

    fn class(&mut self, class: &ClassDecl, full_name: String) -> TypeImage {
        let mut base = None;
        let mut base_meta = None;
        if let Some(declared) = &class.base {
            if class.is_static {
                self.error(
                    declared.span.clone(),
                    "a static class cannot inherit from a base type",
                );
            } else {
                match self.find_base(&declared.node) {
                    Some((module, meta)) => {
                        self.required.insert(module.clone());
                        base = Some(BaseRef {
                            full_name: meta.full_name.clone(),
                            module,
                            generic_args: declared.node.args.iter().map(TypeRef::render).collect(),
                        });
                        base_meta = Some(meta);
                    }
                    None => self.error(
                        declared.span.clone(),
                        format!(
                            "the base type '{}' could not be found",
                            declared.node.render()
                        ),
                    ),
                }
            }
        }

        self.ty = TypeState {
            is_static: class.is_static,
            base: base_meta,
            ..TypeState::default()
        };

        let decls: Vec<&FnDecl> = class
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Function(decl) => Some(decl),
                Member::Execute(_) => None,
            })
            .collect();

        for decl in &decls {
            let name = &decl.name.node;
            if self.ty.own.contains_key(name) {
                self.error(
                    decl.name.span.clone(),
                    format!("the type '{full_name}' already defines a function '{name}'"),
                );
            } else {
                let signature = Signature {
                    index: self.ty.functions.len(),
                    arity: decl.params.len(),
                };
                self.ty.own.insert(name.clone(), signature);
            }
            self.ty.functions.push(placeholder(decl, false));
        }

        for (index, decl) in decls.iter().enumerate() {
            let image = self.function(decl, false);
            self.ty.functions[index] = image;
        }

        let mut execute = None;
        for member in &class.members {
            let Member::Execute(body) = member else {
                continue;
            };
            if class.is_static {
                self.error(body.span.clone(), "a static class cannot have an execute body");
            } else if execute.is_some() {
                self.error(body.span.clone(), "the execute body is already defined");
            } else {
                execute = Some(self.body("execute", &[], &body.node, false));
            }
        }
        if !class.is_static && execute.is_none() {
            execute = Some(FunctionImage {
                name: "execute".to_string(),
                params: 0,
                slots: 0,
                body: Vec::new(),
                local: false,
            });
        }

        let state = std::mem::take(&mut self.ty);
        TypeImage {
            full_name,
            kind: if class.is_static {
                TypeKind::Library
            } else {
                TypeKind::Template
            },
            base,
            functions: state.functions,
            execute,
        }
    }

    fn function(&mut self, decl: &FnDecl, local: bool) -> FunctionImage {
        self.body(&decl.name.node, &decl.params, &decl.body, local)
    }

    /// Resolve a function body in a fresh frame
    fn body(
        &mut self,
        name: &str,
        params: &[Spanned<String>],
        body: &[Spanned<Stmt>],
        local: bool,
    ) -> FunctionImage {
        self.ty.frames.push(Frame::default());
        let mut seen = HashSet::new();
        for param in params {
            if !seen.insert(param.node.as_str()) {
                self.error(
                    param.span.clone(),
                    format!("the parameter name '{}' is a duplicate", param.node),
                );
            }
            self.bind(&param.node);
        }
        let instrs = self.block(body);
        let frame = self.ty.frames.pop().unwrap_or_default();
        FunctionImage {
            name: name.to_string(),
            params: params.len(),
            slots: frame.next,
            body: instrs,
            local,
        }
    }

    fn push_scope(&mut self) {
        if let Some(frame) = self.ty.frames.last_mut() {
            frame.scopes.push(HashMap::new());
        }
        self.ty.fn_scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if let Some(frame) = self.ty.frames.last_mut() {
            frame.scopes.pop();
        }
        self.ty.fn_scopes.pop();
    }

    /// Allocate a new slot for `name` in the innermost scope
    fn bind(&mut self, name: &str) -> usize {
        let Some(frame) = self.ty.frames.last_mut() else {
            return 0;
        };
        let slot = frame.next;
        frame.next += 1;
        if let Some(scope) = frame.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn lookup_local(&self, name: &str) -> Option<Local> {
        let mut frames = self.ty.frames.iter().rev();
        if let Some(current) = frames.next() {
            if let Some(slot) = current.scopes.iter().rev().find_map(|s| s.get(name)) {
                return Some(Local::Slot(*slot));
            }
        }
        frames
            .any(|f| f.scopes.iter().any(|s| s.contains_key(name)))
            .then_some(Local::Captured)
    }

    fn has_property(&self, name: &str) -> bool {
        !self.ty.is_static
            && self
                .ty
                .base
                .as_ref()
                .is_some_and(|b| b.properties.iter().any(|p| p == name))
    }

    fn capture_error(&mut self, span: Span, name: &str) {
        self.error(
            span,
            format!("a local function cannot capture '{name}' from an enclosing function"),
        );
    }

    fn block(&mut self, stmts: &[Spanned<Stmt>]) -> Vec<Instr> {
        self.push_scope();
        self.hoist(stmts);
        let instrs = stmts.iter().filter_map(|s| self.stmt(s)).collect();
        self.pop_scope();
        instrs
    }

    /// Reserve functions for the local functions of a block before resolving
    /// its statements, so calls may precede declarations
    fn hoist(&mut self, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            let Stmt::Fn(decl) = &stmt.node else {
                continue;
            };
            let name = &decl.name.node;
            if self.ty.fn_scopes.last().is_some_and(|s| s.contains_key(name)) {
                self.error(
                    decl.name.span.clone(),
                    format!("a local function named '{name}' is already defined in this scope"),
                );
                continue;
            }
            let index = self.ty.functions.len();
            self.ty.functions.push(placeholder(decl, true));
            self.ty.hoisted.insert(decl.name.span.start, index);
            if let Some(scope) = self.ty.fn_scopes.last_mut() {
                scope.insert(
                    name.clone(),
                    Signature {
                        index,
                        arity: decl.params.len(),
                    },
                );
            }
        }
    }

    fn stmt(&mut self, stmt: &Spanned<Stmt>) -> Option<Instr> {
        match &stmt.node {
            Stmt::Let { name, value } => {
                let value = self.expr(value);
                let slot = self.bind(&name.node);
                Some(Instr::Let(slot, value))
            }
            Stmt::Assign { target, value } => {
                let value = self.expr(value);
                let target = self.target(target)?;
                Some(Instr::Assign(target, value))
            }
            Stmt::Expr(expr) => Some(self.expr_stmt(expr)),
            Stmt::Return(value) => Some(Instr::Return(value.as_ref().map(|v| self.expr(v)))),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond);
                let then = self.block(then);
                let otherwise = match otherwise {
                    Some(stmts) => self.block(stmts),
                    None => Vec::new(),
                };
                Some(Instr::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            Stmt::ForEach {
                binding,
                source,
                body,
            } => {
                let source = self.expr(source);
                self.push_scope();
                let slot = self.bind(&binding.node);
                let body = self.block(body);
                self.pop_scope();
                Some(Instr::ForEach { slot, source, body })
            }
            Stmt::While { cond, body } => {
                let cond = self.expr(cond);
                let body = self.block(body);
                Some(Instr::While { cond, body })
            }
            Stmt::Fn(decl) => {
                if let Some(&index) = self.ty.hoisted.get(&decl.name.span.start) {
                    let image = self.function(decl, true);
                    self.ty.functions[index] = image;
                }
                None
            }
        }
    }

    fn target(&mut self, target: &Spanned<Expr>) -> Option<Target> {
        let Expr::Ident(name) = &target.node else {
            self.error(
                target.span.clone(),
                "only local variables and base type properties can be assigned",
            );
            return None;
        };
        match self.lookup_local(name) {
            Some(Local::Slot(slot)) => Some(Target::Local(slot)),
            Some(Local::Captured) => {
                self.capture_error(target.span.clone(), name);
                None
            }
            None if self.has_property(name) => Some(Target::Property(name.clone())),
            None => {
                self.error(
                    target.span.clone(),
                    format!("the name '{name}' does not exist in the current context"),
                );
                None
            }
        }
    }

    fn expr_stmt(&mut self, expr: &Spanned<Expr>) -> Instr {
        if let Expr::Call(callee, args) = &expr.node {
            if let Expr::Ident(name) = &callee.node {
                if let Some(arity) = contract_arity(name) {
                    return self.contract(name, arity, args, expr.span.clone());
                }
            }
        }
        Instr::Eval(self.expr(expr))
    }

    fn contract(&mut self, name: &str, arity: usize, args: &[Spanned<Expr>], span: Span) -> Instr {
        if self.ty.is_static {
            self.error(
                span.clone(),
                format!("'{name}' is not available in a static class"),
            );
        }
        self.check_arity(name, Some(arity), args.len(), span);

        let mut values = args.iter().map(|a| self.expr(a)).collect::<Vec<_>>().into_iter();
        let mut next = || values.next().unwrap_or_else(null);
        match name {
            "Write" => Instr::Write(next()),
            "WriteLiteral" => Instr::WriteLiteral(next()),
            "BeginWriteAttribute" => Instr::BeginAttribute {
                name: next(),
                prefix: next(),
                suffix: next(),
                count: next(),
            },
            "WriteAttributeValue" => Instr::AttributeValue {
                prefix: next(),
                value: next(),
            },
            _ => Instr::EndAttribute,
        }
    }

    fn check_arity(&mut self, name: &str, expected: Option<usize>, supplied: usize, span: Span) {
        if let Some(expected) = expected {
            if expected != supplied {
                self.error(
                    span,
                    format!(
                        "'{name}' takes {expected} argument(s) but {supplied} were supplied"
                    ),
                );
            }
        }
    }

    fn expr(&mut self, expr: &Spanned<Expr>) -> ir::Expr {
        match &expr.node {
            Expr::Null => null(),
            Expr::Bool(b) => ir::Expr::Const(Const::Bool(*b)),
            Expr::Int(i) => ir::Expr::Const(Const::Int(*i)),
            Expr::Float(f) => ir::Expr::Const(Const::Float(*f)),
            Expr::Str(s) => ir::Expr::Const(Const::Str(s.clone())),
            Expr::Ident(name) => self.ident(name, expr.span.clone()),
            Expr::Model => {
                if self.ty.is_static {
                    self.error(expr.span.clone(), "'Model' is not available in a static class");
                }
                ir::Expr::Model
            }
            Expr::Member(inner, name) => {
                ir::Expr::Member(Box::new(self.expr(inner)), name.node.clone())
            }
            Expr::Index(target, index) => {
                ir::Expr::Index(Box::new(self.expr(target)), Box::new(self.expr(index)))
            }
            Expr::Call(callee, args) => self.call(callee, args, expr.span.clone()),
            Expr::Array(items) => ir::Expr::Array(items.iter().map(|i| self.expr(i)).collect()),
            Expr::Lambda(..) => {
                self.error(
                    expr.span.clone(),
                    "lambda expressions are only allowed as method arguments",
                );
                null()
            }
            Expr::Unary(op, operand) => ir::Expr::Unary(*op, Box::new(self.expr(operand))),
            Expr::Binary(op, lhs, rhs) => {
                ir::Expr::Binary(*op, Box::new(self.expr(lhs)), Box::new(self.expr(rhs)))
            }
        }
    }

    fn ident(&mut self, name: &str, span: Span) -> ir::Expr {
        match self.lookup_local(name) {
            Some(Local::Slot(slot)) => ir::Expr::Local(slot),
            Some(Local::Captured) => {
                self.capture_error(span, name);
                null()
            }
            None if self.has_property(name) => ir::Expr::Property(name.to_string()),
            None => {
                self.error(
                    span,
                    format!("the name '{name}' does not exist in the current context"),
                );
                null()
            }
        }
    }

    fn call(&mut self, callee: &Spanned<Expr>, args: &[Spanned<Expr>], span: Span) -> ir::Expr {
        match &callee.node {
            Expr::Ident(name) => {
                if contract_arity(name).is_some() {
                    self.error(span, format!("'{name}' can only be used as a statement"));
                    return null();
                }
                let values = args.iter().map(|a| self.expr(a)).collect();
                match self.function_target(name, callee.span.clone()) {
                    Some((target, arity)) => {
                        self.check_arity(name, arity, args.len(), span);
                        ir::Expr::Call(target, values)
                    }
                    None => null(),
                }
            }
            Expr::Member(inner, method) => {
                if let Some(path) = inner.node.as_path() {
                    if !self.is_value_root(&inner.node) {
                        match self.qualified(&path, method) {
                            Qualified::Found(target, arity) => {
                                let values = args.iter().map(|a| self.expr(a)).collect();
                                self.check_arity(&method.node, arity, args.len(), span);
                                return ir::Expr::Call(target, values);
                            }
                            Qualified::Failed => return null(),
                            Qualified::NotFound => {}
                        }
                    }
                }
                let receiver = self.expr(inner);
                let args = args.iter().map(|a| self.method_arg(a)).collect();
                ir::Expr::Method(Box::new(receiver), method.node.clone(), args)
            }
            _ => {
                self.error(callee.span.clone(), "this expression cannot be called");
                null()
            }
        }
    }

    /// Whether the leftmost name of a member chain denotes a value
    fn is_value_root(&self, expr: &Expr) -> bool {
        match expr.root_ident() {
            Some(root) => self.lookup_local(root).is_some() || self.has_property(root),
            None => true,
        }
    }

    /// `Module.Function(...)` or `Library.Function(...)`
    fn qualified(&mut self, path: &str, function: &Spanned<String>) -> Qualified {
        let env = self.env;
        if let Some(module) = env.modules.iter().find(|m| m.name == path) {
            return match module.function(&function.node) {
                Some(f) => {
                    self.required.insert(module.name.clone());
                    Qualified::Found(
                        Callee::Native {
                            module: module.name.clone(),
                            function: f.name.clone(),
                        },
                        f.arity,
                    )
                }
                None => {
                    self.error(
                        function.span.clone(),
                        format!(
                            "the module '{path}' does not contain a function '{}'",
                            function.node
                        ),
                    );
                    Qualified::Failed
                }
            };
        }

        let class = self
            .candidates(path)
            .into_iter()
            .find(|c| self.libraries.contains_key(c));
        let Some(class) = class else {
            return Qualified::NotFound;
        };
        let signature = self
            .libraries
            .get(&class)
            .and_then(|fns| fns.get(&function.node))
            .copied();
        match signature {
            Some(sig) => Qualified::Found(
                Callee::Library {
                    class,
                    function: sig.index,
                },
                Some(sig.arity),
            ),
            None => {
                self.error(
                    function.span.clone(),
                    format!(
                        "the type '{class}' does not contain a function '{}'",
                        function.node
                    ),
                );
                Qualified::Failed
            }
        }
    }

    /// Unqualified call: local function, own function, base method, then
    /// imported functions
    fn function_target(&mut self, name: &str, span: Span) -> Option<(Callee, Option<usize>)> {
        if let Some(sig) = self.ty.fn_scopes.iter().rev().find_map(|s| s.get(name)) {
            return Some((Callee::Function(sig.index), Some(sig.arity)));
        }
        if let Some(sig) = self.ty.own.get(name) {
            return Some((Callee::Function(sig.index), Some(sig.arity)));
        }
        if !self.ty.is_static {
            if let Some(method) = self.ty.base.as_ref().and_then(|b| b.method(name)) {
                return Some((Callee::BaseMethod(name.to_string()), method.arity));
            }
        }

        let env = self.env;
        let mut found: Vec<(Callee, Option<usize>, String)> = Vec::new();
        for using in &self.usings {
            if let Some(module) = env.modules.iter().find(|m| &m.name == using) {
                if let Some(f) = module.function(name) {
                    found.push((
                        Callee::Native {
                            module: module.name.clone(),
                            function: f.name.clone(),
                        },
                        f.arity,
                        module.name.clone(),
                    ));
                }
            }
            if let Some(sig) = self.libraries.get(using).and_then(|fns| fns.get(name)) {
                found.push((
                    Callee::Library {
                        class: using.clone(),
                        function: sig.index,
                    },
                    Some(sig.arity),
                    using.clone(),
                ));
            }
        }

        match found.len() {
            0 => {
                self.error(
                    span,
                    format!("the name '{name}' does not exist in the current context"),
                );
                None
            }
            1 => {
                let (callee, arity, origin) = found.remove(0);
                if matches!(callee, Callee::Native { .. }) {
                    self.required.insert(origin);
                }
                Some((callee, arity))
            }
            _ => {
                let origins = found
                    .iter()
                    .map(|(_, _, origin)| format!("'{origin}'"))
                    .collect::<Vec<_>>()
                    .join(" and ");
                self.error(
                    span,
                    format!("the call to '{name}' is ambiguous between {origins}"),
                );
                None
            }
        }
    }

    /// Method arguments may be lambdas; their parameters take slots in the
    /// current frame
    fn method_arg(&mut self, arg: &Spanned<Expr>) -> Arg {
        match &arg.node {
            Expr::Lambda(params, body) => {
                self.push_scope();
                let params = params.iter().map(|p| self.bind(&p.node)).collect();
                let body = self.expr(body);
                self.pop_scope();
                Arg::Lambda {
                    params,
                    body: Box::new(body),
                }
            }
            _ => Arg::Value(self.expr(arg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parse;
    use crate::reference::ReferenceSet;

    fn resolve_source(source: &str) -> Resolution {
        let unit = parse(source).expect("should parse");
        let modules = ReferenceSet::standard().metadata();
        let env = Environment {
            modules: &modules,
            linked: &[],
            warnings_as_errors: false,
        };
        resolve(&unit, &env)
    }

    fn errors(resolution: &Resolution) -> Vec<String> {
        resolution
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_locals_get_slots() {
        let r = resolve_source(
            "class T : Stencil.TemplateBase { execute { let a = 1; let b = a; foreach (x in [a, b]) { Write(x); } } }",
        );
        assert!(errors(&r).is_empty(), "{:?}", errors(&r));
        let execute = r.types[0].execute.as_ref().expect("execute");
        assert_eq!(execute.slots, 3);
        assert!(matches!(execute.body[1], Instr::Let(1, ir::Expr::Local(0))));
        assert!(matches!(execute.body[2], Instr::ForEach { slot: 2, .. }));
        assert_eq!(r.modules, vec!["Stencil".to_string()]);
    }

    #[test]
    fn test_unknown_name_and_base() {
        let r = resolve_source("class T : Missing.Base { execute { Write(nope); } }");
        let errs = errors(&r);
        assert!(errs.iter().any(|e| e.contains("'Missing.Base' could not be found")));
        assert!(errs.iter().any(|e| e.contains("'nope' does not exist")));
    }

    #[test]
    fn test_imported_and_qualified_natives() {
        let r = resolve_source(
            "using Stencil.Text; class T : Stencil.TemplateBase { execute { Write(Raw(\"<b>\")); Write(Stencil.Collections.Len(\"abc\")); } }",
        );
        assert!(errors(&r).is_empty(), "{:?}", errors(&r));
        assert_eq!(
            r.modules,
            vec![
                "Stencil".to_string(),
                "Stencil.Text".to_string(),
                "Stencil.Collections".to_string()
            ]
        );
    }

    #[test]
    fn test_using_diagnostics() {
        let r = resolve_source("using Nowhere; using Stencil.Text; using Stencil.Text; class T : Stencil.TemplateBase { }");
        let severities: Vec<Severity> = r.diagnostics.iter().map(|d| d.severity).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Info]);

        let unit = parse("using Nowhere; class T : Stencil.TemplateBase { }").expect("parse");
        let modules = ReferenceSet::standard().metadata();
        let env = Environment {
            modules: &modules,
            linked: &[],
            warnings_as_errors: true,
        };
        let r = resolve(&unit, &env);
        assert_eq!(r.diagnostics[0].severity, Severity::WarningAsError);
    }

    #[test]
    fn test_local_functions_are_hoisted_and_cannot_capture() {
        let r = resolve_source(
            "class T : Stencil.TemplateBase { execute { Go(1); fn Go(n) { if (n > 0) { Go(n - 1); } } } }",
        );
        assert!(errors(&r).is_empty(), "{:?}", errors(&r));
        assert_eq!(r.types[0].functions.len(), 1);
        assert!(r.types[0].functions[0].local);

        let r = resolve_source(
            "class T : Stencil.TemplateBase { execute { let outer = 1; fn Peek() { return outer; } } }",
        );
        assert!(errors(&r).iter().any(|e| e.contains("cannot capture 'outer'")));
    }

    #[test]
    fn test_lambdas_only_as_method_arguments() {
        let r = resolve_source(
            "class T : Stencil.TemplateBase { execute { let f = x => x; Write(Model.Items.Where(i => i > 1)); } }",
        );
        let errs = errors(&r);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("only allowed as method arguments"));
    }

    #[test]
    fn test_static_class_restrictions() {
        let r = resolve_source("static class Lib { fn F() { Write(Model); } }");
        let errs = errors(&r);
        assert!(errs.iter().any(|e| e.contains("'Write' is not available")));
        assert!(errs.iter().any(|e| e.contains("'Model' is not available")));
    }

    #[test]
    fn test_library_calls_and_arity() {
        let r = resolve_source(
            "namespace Site; static class Fmt { fn Twice(x) { return x * 2; } } class T : Stencil.TemplateBase { execute { Write(Fmt.Twice(2)); Write(Site.Fmt.Twice(1, 2)); } }",
        );
        let errs = errors(&r);
        assert_eq!(errs.len(), 1, "{:?}", errs);
        assert!(errs[0].contains("takes 1 argument(s) but 2 were supplied"));
        assert_eq!(r.types[0].kind, TypeKind::Library);
        assert_eq!(r.types[1].full_name, "Site.T");
    }

    #[test]
    fn test_duplicates() {
        let r = resolve_source(
            "class T : Stencil.TemplateBase { fn F() { } fn F() { } } class T : Stencil.TemplateBase { }",
        );
        let errs = errors(&r);
        assert!(errs.iter().any(|e| e.contains("already defines a function 'F'")));
        assert!(errs.iter().any(|e| e.contains("type 'T' is already defined")));
    }

    #[test]
    fn test_contract_ops_are_statements() {
        let r = resolve_source("class T : Stencil.TemplateBase { execute { let x = Write(1); } }");
        assert!(errors(&r)[0].contains("can only be used as a statement"));
    }
}
