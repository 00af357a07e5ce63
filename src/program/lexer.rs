//! Lexer for program text using logos

use logos::Logos;

pub use crate::error::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Declaration keywords
    #[token("namespace")]
    Namespace,
    #[token("using")]
    Using,
    #[token("class")]
    Class,
    #[token("static")]
    Static,
    #[token("execute")]
    Execute,
    #[token("fn")]
    Fn,

    // Statement keywords
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("foreach")]
    Foreach,
    #[token("in")]
    In,
    #[token("while")]
    While,

    // Value keywords
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("Model")]
    Model,

    // Operators (longer patterns first)
    #[token("=>")]
    FatArrow,
    #[token("==")]
    EqualsEquals,
    #[token("!=")]
    NotEquals,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    Coalesce,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Equals,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Delimiters
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,
}

/// Strip the quotes of a string literal and resolve its escapes.
/// Unknown escapes make the literal invalid.
fn unescape(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            _ => return None,
        }
    }
    Some(out)
}

/// Result of lexing a whole program
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<(Token, Span)>,
    /// Spans that did not form a valid token
    pub errors: Vec<Span>,
}

/// Lex input string into tokens with spans
pub fn lex(input: &str) -> Lexed {
    let mut lexed = Lexed::default();
    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(t) => lexed.tokens.push((t, span)),
            Err(()) => lexed.errors.push(span),
        }
    }
    lexed
}

/// Format a token for human-readable error messages
pub fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string {:?}", s),
        Token::Int(n) => format!("number {}", n),
        Token::Float(n) => format!("number {}", n),
        Token::Namespace => "keyword 'namespace'".to_string(),
        Token::Using => "keyword 'using'".to_string(),
        Token::Class => "keyword 'class'".to_string(),
        Token::Static => "keyword 'static'".to_string(),
        Token::Execute => "keyword 'execute'".to_string(),
        Token::Fn => "keyword 'fn'".to_string(),
        Token::Let => "keyword 'let'".to_string(),
        Token::Var => "keyword 'var'".to_string(),
        Token::Return => "keyword 'return'".to_string(),
        Token::If => "keyword 'if'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::Foreach => "keyword 'foreach'".to_string(),
        Token::In => "keyword 'in'".to_string(),
        Token::While => "keyword 'while'".to_string(),
        Token::Null => "'null'".to_string(),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::Model => "'Model'".to_string(),
        Token::FatArrow => "'=>'".to_string(),
        Token::EqualsEquals => "'=='".to_string(),
        Token::NotEquals => "'!='".to_string(),
        Token::LessOrEqual => "'<='".to_string(),
        Token::GreaterOrEqual => "'>='".to_string(),
        Token::AndAnd => "'&&'".to_string(),
        Token::OrOr => "'||'".to_string(),
        Token::Coalesce => "'??'".to_string(),
        Token::Less => "'<'".to_string(),
        Token::Greater => "'>'".to_string(),
        Token::Equals => "'='".to_string(),
        Token::Bang => "'!'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Percent => "'%'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Semicolon => "';'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::LineComment | Token::BlockComment => "comment".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_declaration_keywords() {
        assert_eq!(
            tokens("namespace using static class execute fn"),
            vec![
                Token::Namespace,
                Token::Using,
                Token::Static,
                Token::Class,
                Token::Execute,
                Token::Fn
            ]
        );
    }

    #[test]
    fn test_identifiers_are_not_keyword_prefixes() {
        assert_eq!(
            tokens("items index Models"),
            vec![
                Token::Ident("items".to_string()),
                Token::Ident("index".to_string()),
                Token::Ident("Models".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a => b == c != d <= e >= f && g || h ?? i"),
            vec![
                Token::Ident("a".to_string()),
                Token::FatArrow,
                Token::Ident("b".to_string()),
                Token::EqualsEquals,
                Token::Ident("c".to_string()),
                Token::NotEquals,
                Token::Ident("d".to_string()),
                Token::LessOrEqual,
                Token::Ident("e".to_string()),
                Token::GreaterOrEqual,
                Token::Ident("f".to_string()),
                Token::AndAnd,
                Token::Ident("g".to_string()),
                Token::OrOr,
                Token::Ident("h".to_string()),
                Token::Coalesce,
                Token::Ident("i".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.14 -10"),
            vec![
                Token::Int(42),
                Token::Float(3.14),
                Token::Minus,
                Token::Int(10)
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""say \"hi\"\n" "back\\slash""#),
            vec![
                Token::String("say \"hi\"\n".to_string()),
                Token::String("back\\slash".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_escape_is_an_error() {
        let lexed = lex(r#"Write("\q");"#);
        assert_eq!(lexed.errors.len(), 1);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("let /* block ** comment */ x // trailing\n;"),
            vec![Token::Let, Token::Ident("x".to_string()), Token::Semicolon]
        );
    }

    #[test]
    fn test_unknown_character_is_reported() {
        let lexed = lex("let x = 1 # 2;");
        assert_eq!(lexed.errors, vec![10..11]);
        assert_eq!(lexed.tokens.len(), 6);
    }
}
