//! Program text: the host language templates are generated into
//!
//! Program text is lexed with logos, parsed with chumsky into [`ast`], and
//! resolved by the compiler into the serializable [`ir`] stored in artifacts.

pub mod ast;
mod grammar;
pub mod ir;
pub mod lexer;

pub use grammar::parse;
