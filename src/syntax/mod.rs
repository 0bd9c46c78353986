//! Syntax layer: tokens, cursors, doc comments and the typed tree.
//!
//! - [`lex`] turns a document into a gap-free [`Token`] vector
//! - [`TokenCursor`] is the positionable view the span finder walks
//! - [`parse_doc_block`] / [`parse_inline_var`] read PHPDoc comments
//! - [`parse`] builds a best-effort [`ast::SourceFile`]

pub mod ast;
mod cursor;
mod doc;
mod parser;
mod token;

pub use cursor::{TokenCursor, TokenSequence};
pub use doc::{
    DocBlock, DocParseError, DocTag, DocTagKind, DocType, DocVariable, InlineVar, MagicMethod,
    parse_doc_block, parse_inline_var,
};
pub use parser::parse;
pub use token::{Token, TokenKind, lex};
