//! Parser implementation using chumsky

use chumsky::error::{RichPattern, RichReason};
use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::{Diagnostic, Origin};
use crate::program::ast::*;
use crate::program::lexer::{format_token, lex, Token};

/// Postfix operations applied to an atom, left to right
#[derive(Debug, Clone)]
enum Postfix {
    Member(Spanned<String>),
    Index(Spanned<Expr>),
    Call(Vec<Spanned<Expr>>),
}

/// Parse program text into an AST. Lexer and parser failures are reported as
/// diagnostics pointing into the program text.
pub fn parse(input: &str) -> Result<Unit, Vec<Diagnostic>> {
    let len = input.len();
    let lexed = lex(input);

    let mut diagnostics: Vec<Diagnostic> = lexed
        .errors
        .iter()
        .map(|span| {
            Diagnostic::error(
                Origin::Program,
                span.clone(),
                format!("invalid token {:?}", &input[span.clone()]),
            )
        })
        .collect();

    let token_iter = lexed
        .tokens
        .into_iter()
        .map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    let (unit, errors) = unit_parser().parse(token_stream).into_output_errors();
    diagnostics.extend(errors.into_iter().map(syntax_diagnostic));

    match unit {
        Some(unit) if diagnostics.is_empty() => Ok(unit),
        _ => Err(diagnostics),
    }
}

fn syntax_diagnostic(err: Rich<'_, Token>) -> Diagnostic {
    let message = match err.reason() {
        RichReason::Custom(msg) => msg.to_string(),
        _ => match err.found() {
            Some(tok) => format!("unexpected {}", format_token(tok)),
            None => "unexpected end of input".to_string(),
        },
    };

    let expected: Vec<String> = err
        .expected()
        .filter_map(|e| match e {
            RichPattern::Token(tok) => Some(format_token(tok)),
            RichPattern::Label(label) => Some(label.to_string()),
            RichPattern::EndOfInput => Some("end of input".to_string()),
            _ => None,
        })
        .collect();

    Diagnostic::error(Origin::Program, err.span().into_range(), message).with_expected(expected)
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> Span {
    e.start()..e.end()
}

fn binary(lhs: Spanned<Expr>, (op, rhs): (BinaryOp, Spanned<Expr>)) -> Spanned<Expr> {
    let span = lhs.span.start..rhs.span.end;
    Spanned::new(Expr::Binary(op, Box::new(lhs), Box::new(rhs)), span)
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let ident = select! {
            Token::Ident(s) => s,
        }
        .labelled("identifier");

        let spanned_ident = ident.map_with(|s, e| Spanned::new(s, span_range(&e.span())));

        let literal = select! {
            Token::Null => Expr::Null,
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Int(n) => Expr::Int(n),
            Token::Float(f) => Expr::Float(f),
            Token::String(s) => Expr::Str(s),
            Token::Model => Expr::Model,
        };

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        // `x => body` or `(x, y) => body`
        let lambda_params = choice((
            spanned_ident.map(|p| vec![p]),
            spanned_ident
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));
        let lambda = lambda_params
            .then_ignore(just(Token::FatArrow))
            .then(expr.clone())
            .map(|(params, body)| Expr::Lambda(params, Box::new(body)));

        let array = args
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::Array);

        // Lambdas come first: both forms start like an identifier or a
        // parenthesized expression
        let atom = choice((lambda, literal, ident.map(Expr::Ident), array))
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
            .or(expr
                .clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)))
            .boxed();

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(spanned_ident)
                .map(Postfix::Member),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Postfix::Index),
            args.delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
                .map(Postfix::Call),
        ))
        .map_with(|op, e| (op, span_range(&e.span())));

        let call_chain = atom
            .foldl(postfix.repeated(), |lhs, (op, op_span)| {
                let span = lhs.span.start..op_span.end;
                let node = match op {
                    Postfix::Member(name) => Expr::Member(Box::new(lhs), name),
                    Postfix::Index(index) => Expr::Index(Box::new(lhs), Box::new(index)),
                    Postfix::Call(args) => Expr::Call(Box::new(lhs), args),
                };
                Spanned::new(node, span)
            })
            .boxed();

        let unary_op = select! {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
        }
        .map_with(|op, e| (op, span_range(&e.span())));

        let unary = unary_op
            .repeated()
            .collect::<Vec<_>>()
            .then(call_chain)
            .map(|(ops, operand)| {
                ops.into_iter().rev().fold(operand, |acc, (op, span)| {
                    let span = span.start..acc.span.end;
                    Spanned::new(Expr::Unary(op, Box::new(acc)), span)
                })
            })
            .boxed();

        let product = unary
            .clone()
            .foldl(
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                }
                .then(unary)
                .repeated(),
                binary,
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                }
                .then(product)
                .repeated(),
                binary,
            )
            .boxed();

        let comparison = sum
            .clone()
            .foldl(
                select! {
                    Token::Less => BinaryOp::Lt,
                    Token::LessOrEqual => BinaryOp::Le,
                    Token::Greater => BinaryOp::Gt,
                    Token::GreaterOrEqual => BinaryOp::Ge,
                }
                .then(sum)
                .repeated(),
                binary,
            )
            .boxed();

        let equality = comparison
            .clone()
            .foldl(
                select! {
                    Token::EqualsEquals => BinaryOp::Eq,
                    Token::NotEquals => BinaryOp::Ne,
                }
                .then(comparison)
                .repeated(),
                binary,
            )
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::AndAnd)
                    .to(BinaryOp::And)
                    .then(equality)
                    .repeated(),
                binary,
            )
            .boxed();

        let or = and
            .clone()
            .foldl(
                just(Token::OrOr).to(BinaryOp::Or).then(and).repeated(),
                binary,
            )
            .boxed();

        or.clone()
            .foldl(
                just(Token::Coalesce)
                    .to(BinaryOp::Coalesce)
                    .then(or)
                    .repeated(),
                binary,
            )
            .labelled("expression")
            .boxed()
    })
}

fn fn_decl<'a, I, B>(block: B) -> impl Parser<'a, I, FnDecl, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    B: Parser<'a, I, Vec<Spanned<Stmt>>, extra::Err<Rich<'a, Token>>> + Clone,
{
    let name = select! {
        Token::Ident(s) => s,
    }
    .labelled("identifier")
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    just(Token::Fn)
        .ignore_then(name.clone())
        .then(
            name.separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        )
        .then(block)
        .map(|((name, params), body)| FnDecl { name, params, body })
}

fn unit_parser<'a, I>() -> impl Parser<'a, I, Unit, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let ident = select! {
        Token::Ident(s) => s,
    }
    .labelled("identifier");

    let spanned_ident = ident.map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let path = ident
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|parts| parts.join("."));

    let spanned_path = path
        .clone()
        .map_with(|p, e| Spanned::new(p, span_range(&e.span())));

    let expr = expr_parser();

    // Recursive statement parser
    let stmt = recursive(|stmt| {
        let block = stmt
            .clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .boxed();

        let binding = just(Token::Let).or(just(Token::Var));

        let let_stmt = binding
            .clone()
            .ignore_then(spanned_ident)
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .then_ignore(just(Token::Semicolon))
            .map(|(name, value)| Stmt::Let { name, value });

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone().or_not())
            .then_ignore(just(Token::Semicolon))
            .map(Stmt::Return);

        let cond = expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let if_stmt = recursive(|if_stmt| {
            just(Token::If)
                .ignore_then(cond.clone())
                .then(block.clone())
                .then(
                    just(Token::Else)
                        .ignore_then(choice((
                            if_stmt.map_with(|s, e| vec![Spanned::new(s, span_range(&e.span()))]),
                            block.clone(),
                        )))
                        .or_not(),
                )
                .map(|((cond, then), otherwise)| Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
        });

        let foreach_stmt = just(Token::Foreach)
            .ignore_then(
                binding
                    .or_not()
                    .ignore_then(spanned_ident)
                    .then_ignore(just(Token::In))
                    .then(expr.clone())
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .then(block.clone())
            .map(|((binding, source), body)| Stmt::ForEach {
                binding,
                source,
                body,
            });

        let while_stmt = just(Token::While)
            .ignore_then(cond)
            .then(block.clone())
            .map(|(cond, body)| Stmt::While { cond, body });

        let fn_stmt = fn_decl(block).map(Stmt::Fn);

        // Expression statement or assignment: `target = value;`
        let expr_stmt = expr
            .clone()
            .then(just(Token::Equals).ignore_then(expr.clone()).or_not())
            .then_ignore(just(Token::Semicolon))
            .map(|(target, value)| match value {
                Some(value) => Stmt::Assign { target, value },
                None => Stmt::Expr(target),
            });

        choice((
            let_stmt,
            return_stmt,
            if_stmt,
            foreach_stmt,
            while_stmt,
            fn_stmt,
            expr_stmt,
        ))
        .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
        .boxed()
    });

    let block = stmt
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
        .boxed();

    let member = choice((
        just(Token::Execute)
            .ignore_then(block.clone())
            .map_with(|body, e| Member::Execute(Spanned::new(body, span_range(&e.span())))),
        fn_decl(block).map(Member::Function),
    ));

    // Base type: `A.B` or `A.B<C, D<E>>`
    let type_ref = recursive(|type_ref| {
        path.clone()
            .then(
                type_ref
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::Less), just(Token::Greater))
                    .or_not(),
            )
            .map(|(path, args)| TypeRef {
                path,
                args: args.unwrap_or_default(),
            })
    });

    let class_decl = just(Token::Static)
        .or_not()
        .then_ignore(just(Token::Class))
        .then(spanned_ident)
        .then(
            just(Token::Colon)
                .ignore_then(type_ref.map_with(|t, e| Spanned::new(t, span_range(&e.span()))))
                .or_not(),
        )
        .then(
            member
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map(|(((is_static, name), base), members)| ClassDecl {
            name,
            is_static: is_static.is_some(),
            base,
            members,
        })
        .map_with(|c, e| Spanned::new(c, span_range(&e.span())));

    let namespace = just(Token::Namespace)
        .ignore_then(spanned_path.clone())
        .then_ignore(just(Token::Semicolon));

    let using = just(Token::Using)
        .ignore_then(spanned_path)
        .then_ignore(just(Token::Semicolon));

    namespace
        .or_not()
        .then(using.repeated().collect::<Vec<_>>())
        .then(class_decl.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|((namespace, usings), classes)| Unit {
            namespace,
            usings,
            classes,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expr {
        let program = format!("class T : Base {{ execute {{ {source}; }} }}");
        let unit = parse(&program).expect("should parse");
        let Member::Execute(body) = &unit.classes[0].node.members[0] else {
            panic!("expected execute member");
        };
        match &body.node[0].node {
            Stmt::Expr(e) => e.node.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unit_header() {
        let unit = parse(
            "namespace Pages;\nusing Stencil.Text;\nusing Site;\nclass Index : Stencil.TemplateBase { execute { } }",
        )
        .expect("should parse");
        assert_eq!(unit.namespace.map(|n| n.node).as_deref(), Some("Pages"));
        assert_eq!(unit.usings.len(), 2);
        assert_eq!(unit.usings[0].node, "Stencil.Text");
        let class = &unit.classes[0].node;
        assert_eq!(class.name.node, "Index");
        assert!(!class.is_static);
        assert_eq!(
            class.base.as_ref().map(|b| b.node.render()).as_deref(),
            Some("Stencil.TemplateBase")
        );
    }

    #[test]
    fn test_parse_generic_base() {
        let unit = parse("class T : Site.Page<Site.Box<Site.User>> { }").expect("should parse");
        let base = unit.classes[0].node.base.clone().expect("base");
        assert_eq!(base.node.render(), "Site.Page<Site.Box<Site.User>>");
    }

    #[test]
    fn test_parse_static_class() {
        let unit = parse("static class Helpers { fn Twice(x) { return x * 2; } }")
            .expect("should parse");
        let class = &unit.classes[0].node;
        assert!(class.is_static);
        assert!(class.base.is_none());
        assert!(matches!(&class.members[0], Member::Function(f) if f.params.len() == 1));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expr("1 + 2 * 3 == 7 && !done");
        let Expr::Binary(BinaryOp::And, lhs, rhs) = expr else {
            panic!("expected &&");
        };
        assert!(matches!(rhs.node, Expr::Unary(UnaryOp::Not, _)));
        let Expr::Binary(BinaryOp::Eq, sum, _) = lhs.node else {
            panic!("expected ==");
        };
        let Expr::Binary(BinaryOp::Add, _, product) = sum.node else {
            panic!("expected +");
        };
        assert!(matches!(product.node, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expr(r#"Model.Dictionary["K1"].x"#);
        let Expr::Member(inner, name) = expr else {
            panic!("expected member");
        };
        assert_eq!(name.node, "x");
        assert!(matches!(inner.node, Expr::Index(_, _)));
    }

    #[test]
    fn test_lambda_arguments() {
        let expr = parse_expr("items.Where(x => x > 1).Select((a) => a.Name)");
        let Expr::Call(callee, args) = expr else {
            panic!("expected call");
        };
        assert!(matches!(callee.node, Expr::Member(_, _)));
        assert!(matches!(&args[0].node, Expr::Lambda(params, _) if params.len() == 1));
    }

    #[test]
    fn test_parenthesized_is_not_lambda() {
        assert!(matches!(
            parse_expr("(a + b) * c"),
            Expr::Binary(BinaryOp::Mul, _, _)
        ));
    }

    #[test]
    fn test_statements() {
        let unit = parse(
            r#"class T : B {
                execute {
                    let x = 1;
                    var y = "s";
                    x = x + 1;
                    if (x > 1) { Write(x); } else if (x < 0) { } else { return; }
                    foreach (var item in Model.Items) { Write(item); }
                    foreach (item in [1, 2]) { }
                    while (false) { }
                    fn Local(a, b) { return a ?? b; }
                }
            }"#,
        )
        .expect("should parse");
        let Member::Execute(body) = &unit.classes[0].node.members[0] else {
            panic!("expected execute");
        };
        let kinds: Vec<_> = body
            .node
            .iter()
            .map(|s| match &s.node {
                Stmt::Let { .. } => "let",
                Stmt::Assign { .. } => "assign",
                Stmt::Expr(_) => "expr",
                Stmt::Return(_) => "return",
                Stmt::If { .. } => "if",
                Stmt::ForEach { .. } => "foreach",
                Stmt::While { .. } => "while",
                Stmt::Fn(_) => "fn",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["let", "let", "assign", "if", "foreach", "foreach", "while", "fn"]
        );
    }

    #[test]
    fn test_else_if_nests() {
        let unit = parse("class T : B { execute { if (a) { } else if (b) { } } }")
            .expect("should parse");
        let Member::Execute(body) = &unit.classes[0].node.members[0] else {
            panic!("expected execute");
        };
        let Stmt::If { otherwise, .. } = &body.node[0].node else {
            panic!("expected if");
        };
        let otherwise = otherwise.as_ref().expect("else branch");
        assert!(matches!(otherwise[0].node, Stmt::If { .. }));
    }

    #[test]
    fn test_missing_semicolon_is_reported() {
        let errors = parse("class T : B { execute { Write(1) } }").expect_err("should fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].origin, Origin::Program);
        assert!(errors[0].expected.iter().any(|e| e == "';'"));
    }

    #[test]
    fn test_invalid_token_is_reported() {
        let errors = parse("class T : B { execute { Write(#); } }").expect_err("should fail");
        assert!(errors[0].message.contains("invalid token"));
    }
}
