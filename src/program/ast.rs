//! Abstract Syntax Tree types for program text

pub use crate::error::Span;
pub use crate::program::ir::{BinaryOp, UnaryOp};

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A parsed compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub namespace: Option<Spanned<String>>,
    pub usings: Vec<Spanned<String>>,
    pub classes: Vec<Spanned<ClassDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Spanned<String>,
    pub is_static: bool,
    pub base: Option<Spanned<TypeRef>>,
    pub members: Vec<Member>,
}

/// A (possibly generic) type reference such as `Site.Page<Site.User>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub path: String,
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.path.clone();
        }
        let args = self
            .args
            .iter()
            .map(TypeRef::render)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}<{}>", self.path, args)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Execute(Spanned<Vec<Spanned<Stmt>>>),
    Function(FnDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Spanned<String>,
    pub params: Vec<Spanned<String>>,
    pub body: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: Spanned<String>,
        value: Spanned<Expr>,
    },
    Assign {
        target: Spanned<Expr>,
        value: Spanned<Expr>,
    },
    Expr(Spanned<Expr>),
    Return(Option<Spanned<Expr>>),
    If {
        cond: Spanned<Expr>,
        then: Vec<Spanned<Stmt>>,
        /// `else if` chains nest as a single `If` statement here
        otherwise: Option<Vec<Spanned<Stmt>>>,
    },
    ForEach {
        binding: Spanned<String>,
        source: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    While {
        cond: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    Fn(FnDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Model,
    Member(Box<Spanned<Expr>>, Spanned<String>),
    Index(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Call(Box<Spanned<Expr>>, Vec<Spanned<Expr>>),
    Array(Vec<Spanned<Expr>>),
    Lambda(Vec<Spanned<String>>, Box<Spanned<Expr>>),
    Unary(UnaryOp, Box<Spanned<Expr>>),
    Binary(BinaryOp, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
}

impl Expr {
    /// The dotted path this expression spells, if it is a chain of plain
    /// identifiers (`a.b.c`)
    pub fn as_path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member(inner, member) => {
                let mut path = inner.node.as_path()?;
                path.push('.');
                path.push_str(&member.node);
                Some(path)
            }
            _ => None,
        }
    }

    /// Leftmost identifier of a member chain
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::Member(inner, _) => inner.node.root_ident(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp<T>(node: T) -> Spanned<T> {
        Spanned::new(node, 0..1)
    }

    #[test]
    fn test_path_of_member_chain() {
        let expr = Expr::Member(
            Box::new(sp(Expr::Member(
                Box::new(sp(Expr::Ident("Site".into()))),
                sp("Helpers".to_string()),
            ))),
            sp("Format".to_string()),
        );
        assert_eq!(expr.as_path().as_deref(), Some("Site.Helpers.Format"));
        assert_eq!(expr.root_ident(), Some("Site"));
    }

    #[test]
    fn test_model_is_not_a_path() {
        let expr = Expr::Member(Box::new(sp(Expr::Model)), sp("Name".to_string()));
        assert_eq!(expr.as_path(), None);
    }

    #[test]
    fn test_type_ref_render() {
        let ty = TypeRef {
            path: "Site.Pair".into(),
            args: vec![
                TypeRef { path: "A".into(), args: vec![] },
                TypeRef {
                    path: "Site.Box".into(),
                    args: vec![TypeRef { path: "B".into(), args: vec![] }],
                },
            ],
        };
        assert_eq!(ty.render(), "Site.Pair<A, Site.Box<B>>");
    }
}
